use slog::debug;

use crate::compiler::CompileTarget;
use crate::error::{CompileError, ErrorExt, SemanticError};
use crate::instruction::OpCode;
use crate::symbol_table::{Binding, Class, Type};
use crate::token::TokenKind;

use super::{Frame, Parser};

impl<'s, T: CompileTarget> Parser<'s, T> {
    /// Compiles one top level declaration.
    pub(super) fn declaration(&mut self) -> Result<(), CompileError> {
        match self.token.kind {
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(())
            }
            TokenKind::Enum => self.enum_declaration().context("in enum declaration"),
            kind if kind.is_base_type() => self.global_declaration(),
            _ => Err(self.unexpected("declaration")),
        }
    }

    fn enum_declaration(&mut self) -> Result<(), CompileError> {
        self.advance()?;

        if self.token.kind == TokenKind::Id {
            self.advance()?;
        }

        self.expect(TokenKind::LeftBrace)?;

        let mut value = 0;

        while self.token.kind != TokenKind::RightBrace {
            let name = self.expect_identifier()?;

            if self.token.kind == TokenKind::Assign {
                self.advance()?;

                if self.token.kind != TokenKind::Num {
                    return Err(self.unexpected(TokenKind::Num));
                }

                value = self.advance()?.number();
            }

            self.symbols
                .add_symbol(&name, TokenKind::Id, Binding::new(Class::EnumConstant, Type::Int, value))
                .map_err(|err| self.semantic(err))?;

            value += 1;

            if self.token.kind == TokenKind::Comma {
                self.advance()?;
            } else if self.token.kind != TokenKind::RightBrace {
                return Err(self.unexpected(TokenKind::RightBrace));
            }
        }

        self.advance()?;
        Ok(())
    }

    /// Compiles global variables and function definitions sharing a base type.
    fn global_declaration(&mut self) -> Result<(), CompileError> {
        let base = self.parse_base_type()?;

        loop {
            let ty = base.pointer_to(self.parse_pointer_levels()?);
            let name = self.expect_identifier()?;

            if self.token.kind == TokenKind::LeftParen {
                return self
                    .function(&name, ty)
                    .context(format!("in function `{}`", name));
            }

            let mut binding = Binding::new(Class::Global, ty, 0);
            let words = if self.token.kind == TokenKind::Brak {
                let length = self.array_length()?;
                binding.array = Some(length);
                length
            } else {
                1
            };

            binding.value = self.lexer.data_mut().reserve_words(words) as i64;
            self.declare(&name, binding)?;

            debug!(self.logger, "reserved global";
                   "name" => name.as_str(), "address" => binding.value, "words" => words);

            if self.token.kind != TokenKind::Comma {
                break;
            }

            self.advance()?;
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    /// Adds a global or function symbol, rejecting a name that already has another meaning.
    fn declare(&mut self, name: &str, binding: Binding) -> Result<(), CompileError> {
        let id = self
            .symbols
            .add_symbol(name, TokenKind::Id, binding)
            .map_err(|err| self.semantic(err))?;

        if self.symbols.symbol(id).binding.class != binding.class {
            return Err(self.semantic(SemanticError::ConflictingDeclaration(name.to_string())));
        }

        Ok(())
    }

    fn function(&mut self, name: &str, ty: Type) -> Result<(), CompileError> {
        let start = self.here();
        self.declare(name, Binding::new(Class::Function, ty, start as i64))?;

        self.expect(TokenKind::LeftParen)?;

        let mut count = 0;

        while self.token.kind != TokenKind::RightParen {
            let ty = self.parse_type()?;
            let param = self.expect_identifier()?;

            self.symbols
                .add_symbol(&param, TokenKind::Id, Binding::new(Class::Local, ty, count))
                .map_err(|err| self.semantic(err))?;

            count += 1;

            if self.token.kind == TokenKind::Comma {
                self.advance()?;
            } else if self.token.kind != TokenKind::RightParen {
                return Err(self.unexpected(TokenKind::RightParen));
            }
        }

        self.advance()?;

        self.frame = Frame {
            ibp: count + 1,
            next: count + 1,
            max_target: 0,
        };

        if self.token.kind != TokenKind::LeftBrace {
            return Err(self.unexpected(TokenKind::LeftBrace));
        }

        let frame = self.emit_arg(OpCode::NewFrame, 0);
        self.advance()?;

        while self.token.kind != TokenKind::RightBrace {
            if self.token.kind == TokenKind::Eof {
                return Err(self.unexpected(TokenKind::RightBrace));
            }

            self.statement()?;
        }

        self.target.patch(frame, self.frame.next - self.frame.ibp);

        // Falling off the end, or jumping to it, must still return.
        if self.last_opcode() != Some(OpCode::Return) || self.frame.max_target == self.here() {
            self.emit(OpCode::Return);
        }

        self.advance()?;
        self.symbols.recover_all_locals();

        debug!(self.logger, "compiled function";
               "name" => name, "start" => start, "params" => count,
               "locals" => self.frame.next - self.frame.ibp);

        Ok(())
    }
}
