use crate::compiler::CompileTarget;
use crate::error::{CompileError, ErrorExt, SemanticError};
use crate::instruction::OpCode;
use crate::symbol_table::{Binding, Class};
use crate::token::TokenKind;

use super::expression::Precedence;
use super::Parser;

impl<'s, T: CompileTarget> Parser<'s, T> {
    pub(super) fn statement(&mut self) -> Result<(), CompileError> {
        let result = match self.token.kind {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Return => {
                self.advance()?;

                if self.token.kind != TokenKind::Semicolon {
                    self.expression(Precedence::Assign)?;
                }

                self.emit(OpCode::Return);
                self.expect(TokenKind::Semicolon)?;
                Ok(())
            }
            TokenKind::LeftBrace => {
                self.advance()?;

                while self.token.kind != TokenKind::RightBrace {
                    if self.token.kind == TokenKind::Eof {
                        return Err(self.unexpected(TokenKind::RightBrace));
                    }

                    self.statement()?;
                }

                self.advance()?;
                Ok(())
            }
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(())
            }
            kind if kind.is_base_type() => self.local_declaration(),
            _ => {
                self.expression(Precedence::Assign)?;
                self.expect(TokenKind::Semicolon)?;
                Ok(())
            }
        };

        result.context("in statement")
    }

    fn condition(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::LeftParen)?;
        self.expression(Precedence::Assign)?;
        self.expect(TokenKind::RightParen)?;
        Ok(())
    }

    fn if_statement(&mut self) -> Result<(), CompileError> {
        self.advance()?;
        self.condition()?;

        let jz = self.emit_arg(OpCode::JumpZero, 0);
        self.statement()?;

        if self.token.kind == TokenKind::Else {
            self.advance()?;
            // Skip over the jump that ends the then branch.
            self.patch(jz, self.here() + 1);
            let jmp = self.emit_arg(OpCode::Jump, 0);
            self.statement()?;
            self.patch(jmp, self.here());
        } else {
            self.patch(jz, self.here());
        }

        Ok(())
    }

    fn while_statement(&mut self) -> Result<(), CompileError> {
        self.advance()?;

        let start = self.here();
        self.condition()?;

        let jz = self.emit_arg(OpCode::JumpZero, 0);
        self.statement()?;
        self.emit_arg(OpCode::Jump, start as i64);
        self.patch(jz, self.here());

        Ok(())
    }

    /// Declares one or more locals of the current function, with optional initializers.
    fn local_declaration(&mut self) -> Result<(), CompileError> {
        let base = self.parse_base_type()?;

        loop {
            let ty = base.pointer_to(self.parse_pointer_levels()?);
            let name = self.expect_identifier()?;
            let mut binding = Binding::new(Class::Local, ty, 0);

            if self.token.kind == TokenKind::Brak {
                let length = self.array_length()?;
                self.frame.next += length as i64;
                binding.array = Some(length);
            } else {
                self.frame.next += 1;
            }

            binding.value = self.frame.next;

            self.symbols
                .add_symbol(&name, TokenKind::Id, binding)
                .map_err(|err| self.semantic(err))?;

            if binding.array.is_none() && self.token.kind == TokenKind::Assign {
                self.advance()?;
                self.emit_arg(OpCode::LoadEffectiveAddress, self.frame.ibp - binding.value);
                self.emit(OpCode::Push);
                self.expression(Precedence::Assign)?;
                self.emit(binding.ty.store());
            }

            if self.token.kind != TokenKind::Comma {
                break;
            }

            self.advance()?;
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    /// Parses `[N]` where `N` is a positive integer literal.
    pub(super) fn array_length(&mut self) -> Result<usize, CompileError> {
        self.expect(TokenKind::Brak)?;

        let length = match self.token.kind {
            TokenKind::Num if self.token.number() > 0 => self.token.number() as usize,
            _ => return Err(self.semantic(SemanticError::MalformedArraySize)),
        };

        self.advance()?;
        self.expect(TokenKind::RightBracket)?;

        Ok(length)
    }
}
