use std::convert::TryFrom;

use crate::compiler::CompileTarget;
use crate::error::{CompileError, SemanticError};
use crate::instruction::{Instruction, OpCode};
use crate::symbol_table::{Class, Type};
use crate::token::TokenKind;

use super::Parser;

/// Binding strength of the binary and postfix operators, weakest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assign,
    Cond,
    Lor,
    Land,
    Or,
    Xor,
    And,
    Equality,
    Relational,
    Shift,
    Additive,
    Multiplicative,
    Postfix,
}

impl Precedence {
    pub fn of(kind: TokenKind) -> Precedence {
        match kind {
            TokenKind::Assign => Precedence::Assign,
            TokenKind::Cond => Precedence::Cond,
            TokenKind::Lor => Precedence::Lor,
            TokenKind::Land => Precedence::Land,
            TokenKind::Or => Precedence::Or,
            TokenKind::Xor => Precedence::Xor,
            TokenKind::And => Precedence::And,
            TokenKind::Eq | TokenKind::Ne => Precedence::Equality,
            TokenKind::Lt | TokenKind::Gt | TokenKind::Le | TokenKind::Ge => Precedence::Relational,
            TokenKind::Shl | TokenKind::Shr => Precedence::Shift,
            TokenKind::Add | TokenKind::Sub => Precedence::Additive,
            TokenKind::Mul | TokenKind::Div | TokenKind::Mod => Precedence::Multiplicative,
            TokenKind::Inc | TokenKind::Dec | TokenKind::Brak => Precedence::Postfix,
            _ => Precedence::None,
        }
    }
}

/// Opcode and right operand precedence of the plain binary operators.
fn binary_operator(kind: TokenKind) -> Option<(OpCode, Precedence)> {
    let op = match kind {
        TokenKind::Or => (OpCode::Or, Precedence::Xor),
        TokenKind::Xor => (OpCode::Xor, Precedence::And),
        TokenKind::And => (OpCode::And, Precedence::Equality),
        TokenKind::Eq => (OpCode::Equal, Precedence::Relational),
        TokenKind::Ne => (OpCode::NotEqual, Precedence::Relational),
        TokenKind::Lt => (OpCode::Less, Precedence::Shift),
        TokenKind::Gt => (OpCode::Greater, Precedence::Shift),
        TokenKind::Le => (OpCode::LessEqual, Precedence::Shift),
        TokenKind::Ge => (OpCode::GreaterEqual, Precedence::Shift),
        TokenKind::Shl => (OpCode::ShiftLeft, Precedence::Additive),
        TokenKind::Shr => (OpCode::ShiftRight, Precedence::Additive),
        TokenKind::Mul => (OpCode::Multiply, Precedence::Postfix),
        TokenKind::Div => (OpCode::Divide, Precedence::Postfix),
        TokenKind::Mod => (OpCode::Modulo, Precedence::Postfix),
        _ => return None,
    };

    Some(op)
}

impl<'s, T: CompileTarget> Parser<'s, T> {
    /// Compiles an expression whose operators bind at least as tightly as `min`.
    ///
    /// The value is left in the accumulator and its type in `self.ty`.
    pub(super) fn expression(&mut self, min: Precedence) -> Result<(), CompileError> {
        debug_assert!(min > Precedence::None);

        self.unary()?;

        while Precedence::of(self.token.kind) >= min {
            self.binary()?;
        }

        Ok(())
    }

    fn unary(&mut self) -> Result<(), CompileError> {
        match self.token.kind {
            TokenKind::Num => {
                self.emit_arg(OpCode::LoadImmediate, self.token.number());
                self.advance()?;
                self.ty = Type::Int;
            }
            TokenKind::Str => {
                self.emit_arg(OpCode::LoadImmediate, self.token.number());
                self.advance()?;
                self.ty = Type::Pointer;
            }
            TokenKind::Sizeof => {
                self.advance()?;
                self.expect(TokenKind::LeftParen)?;
                let ty = self.parse_type()?;
                self.expect(TokenKind::RightParen)?;
                self.emit_arg(OpCode::LoadImmediate, ty.size());
                self.ty = Type::Int;
            }
            TokenKind::Id => self.identifier()?,
            TokenKind::LeftParen => {
                self.advance()?;

                if self.token.kind.is_base_type() {
                    let ty = self.parse_type()?;
                    self.expect(TokenKind::RightParen)?;
                    self.expression(Precedence::Postfix)?;
                    self.ty = ty;
                } else {
                    self.expression(Precedence::Assign)?;
                    self.expect(TokenKind::RightParen)?;
                }
            }
            TokenKind::Mul => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;

                if self.ty == Type::Char {
                    return Err(self.semantic(SemanticError::InvalidDereference));
                }

                self.emit(OpCode::LoadInt);
                self.ty = Type::Int;
            }
            TokenKind::And => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;

                match self.last_opcode() {
                    Some(OpCode::LoadChar) | Some(OpCode::LoadInt) => {
                        self.target.retract();
                    }
                    _ => return Err(self.semantic(SemanticError::InvalidAddressOf)),
                }

                self.ty = Type::Pointer;
            }
            TokenKind::Not => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;
                self.emit(OpCode::Push);
                self.emit_arg(OpCode::LoadImmediate, 0);
                self.emit(OpCode::Equal);
                self.ty = Type::Int;
            }
            TokenKind::Tilde => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;
                self.emit(OpCode::Push);
                self.emit_arg(OpCode::LoadImmediate, -1);
                self.emit(OpCode::Xor);
                self.ty = Type::Int;
            }
            TokenKind::Add => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;
                self.ty = Type::Int;
            }
            TokenKind::Sub => {
                self.advance()?;
                self.expression(Precedence::Postfix)?;
                self.emit(OpCode::Push);
                self.emit_arg(OpCode::LoadImmediate, -1);
                self.emit(OpCode::Multiply);
                self.ty = Type::Int;
            }
            TokenKind::Inc | TokenKind::Dec => {
                let kind = self.advance()?.kind;
                self.expression(Precedence::Postfix)?;
                self.reload_lvalue(kind)?;
                self.step_value(kind == TokenKind::Inc);
                self.emit(self.ty.store());
            }
            _ => return Err(self.unexpected("expression")),
        }

        Ok(())
    }

    /// Compiles a variable reference, a call or an enum constant.
    fn identifier(&mut self) -> Result<(), CompileError> {
        let name = self.advance()?.name().to_string();

        if self.token.kind == TokenKind::LeftParen {
            return self.call(&name);
        }

        let id = self.resolve(&name)?;
        let binding = self.symbols.symbol(id).binding;

        match binding.class {
            Class::EnumConstant => {
                self.emit_arg(OpCode::LoadImmediate, binding.value);
                self.ty = Type::Int;
                return Ok(());
            }
            Class::Local => {
                self.emit_arg(OpCode::LoadEffectiveAddress, self.frame.ibp - binding.value);
            }
            Class::Global => {
                self.emit_arg(OpCode::LoadImmediate, binding.value);
            }
            _ => return Err(self.undefined(&name)),
        }

        // Arrays evaluate to the address of their first element.
        if binding.array.is_some() {
            self.ty = Type::Pointer;
        } else {
            self.emit(binding.ty.load());
            self.ty = binding.ty;
        }

        Ok(())
    }

    fn call(&mut self, name: &str) -> Result<(), CompileError> {
        self.advance()?;

        let id = self.resolve(name)?;
        let mut count = 0;

        while self.token.kind != TokenKind::RightParen {
            self.expression(Precedence::Assign)?;
            self.emit(OpCode::Push);
            count += 1;

            if self.token.kind == TokenKind::Comma {
                self.advance()?;
            } else if self.token.kind != TokenKind::RightParen {
                return Err(self.unexpected(TokenKind::RightParen));
            }
        }

        self.advance()?;

        let binding = self.symbols.symbol(id).binding;

        match binding.class {
            Class::SystemCall => {
                let opcode = OpCode::try_from(binding.value as u8)
                    .map_err(|_| self.semantic(SemanticError::NotCallable(name.to_string())))?;
                self.emit(opcode);
            }
            Class::Function => {
                self.emit_arg(OpCode::Call, binding.value);
            }
            _ => return Err(self.semantic(SemanticError::NotCallable(name.to_string()))),
        }

        if count > 0 {
            self.emit_arg(OpCode::DropArguments, count);
        }

        self.ty = binding.ty;

        Ok(())
    }

    /// Compiles one binary or postfix operator whose left operand is in the accumulator.
    fn binary(&mut self) -> Result<(), CompileError> {
        let left = self.ty;
        let kind = self.advance()?.kind;

        match kind {
            TokenKind::Assign => {
                self.push_lvalue("=")?;
                self.expression(Precedence::Assign)?;
                self.ty = left;
                self.emit(left.store());
            }
            TokenKind::Cond => {
                let jz = self.emit_arg(OpCode::JumpZero, 0);
                self.expression(Precedence::Assign)?;
                self.expect(TokenKind::Colon)?;
                let jmp = self.emit_arg(OpCode::Jump, 0);
                self.patch(jz, self.here());
                self.expression(Precedence::Cond)?;
                self.patch(jmp, self.here());
            }
            TokenKind::Lor => {
                let jnz = self.emit_arg(OpCode::JumpNotZero, 0);
                self.expression(Precedence::Land)?;
                self.patch(jnz, self.here());
                self.ty = Type::Int;
            }
            TokenKind::Land => {
                let jz = self.emit_arg(OpCode::JumpZero, 0);
                self.expression(Precedence::Or)?;
                self.patch(jz, self.here());
                self.ty = Type::Int;
            }
            TokenKind::Add => {
                let push = self.emit(OpCode::Push);
                self.expression(Precedence::Multiplicative)?;

                if left == Type::Pointer {
                    self.scale();
                    self.ty = left;
                } else if self.ty == Type::Pointer {
                    self.scale_before(push);
                } else {
                    self.ty = left;
                }

                self.emit(OpCode::Add);
            }
            TokenKind::Sub => {
                self.emit(OpCode::Push);
                self.expression(Precedence::Multiplicative)?;

                if left == Type::Pointer && self.ty == Type::Pointer {
                    self.emit(OpCode::Subtract);
                    self.emit(OpCode::Push);
                    self.emit_arg(OpCode::LoadImmediate, Type::Pointer.size());
                    self.emit(OpCode::Divide);
                    self.ty = Type::Int;
                } else if left == Type::Pointer {
                    self.scale();
                    self.emit(OpCode::Subtract);
                    self.ty = left;
                } else {
                    self.emit(OpCode::Subtract);
                    self.ty = left;
                }
            }
            TokenKind::Inc | TokenKind::Dec => {
                let increment = kind == TokenKind::Inc;
                self.reload_lvalue(kind)?;
                self.step_value(increment);
                self.emit(self.ty.store());
                // Undo the step so the expression yields the old value.
                self.step_value(!increment);
            }
            TokenKind::Brak => {
                self.emit(OpCode::Push);
                self.expression(Precedence::Assign)?;
                self.expect(TokenKind::RightBracket)?;

                if left != Type::Pointer {
                    return Err(self.semantic(SemanticError::InvalidIndex));
                }

                self.scale();
                self.emit(OpCode::Add);
                self.emit(OpCode::LoadInt);
                self.ty = Type::Int;
            }
            _ => {
                let (opcode, right) = binary_operator(kind)
                    .ok_or_else(|| CompileError::syntax("operator", kind, self.token.line, self.token.column))?;

                self.emit(OpCode::Push);
                self.expression(right)?;
                self.emit(opcode);
                self.ty = Type::Int;
            }
        }

        Ok(())
    }

    /// Turns the trailing load of an lvalue into a push of its address.
    fn push_lvalue(&mut self, operator: &'static str) -> Result<(), CompileError> {
        if let Some(ins) = self.target.last_mut() {
            if ins.opcode == OpCode::LoadChar || ins.opcode == OpCode::LoadInt {
                ins.opcode = OpCode::Push;
                ins.arg = None;
                return Ok(());
            }
        }

        Err(self.semantic(SemanticError::InvalidLvalue(operator)))
    }

    /// Keeps the address of an lvalue on the stack and reloads its value.
    fn reload_lvalue(&mut self, kind: TokenKind) -> Result<(), CompileError> {
        let load = self.last_opcode();
        let operator = if kind == TokenKind::Inc { "++" } else { "--" };

        self.push_lvalue(operator)?;

        if let Some(load) = load {
            self.emit(load);
        }

        Ok(())
    }

    /// Adds or subtracts one element to the accumulator.
    fn step_value(&mut self, increment: bool) {
        let step = if self.ty == Type::Pointer {
            Type::Pointer.size()
        } else {
            1
        };

        self.emit(OpCode::Push);
        self.emit_arg(OpCode::LoadImmediate, step);
        self.emit(if increment { OpCode::Add } else { OpCode::Subtract });
    }

    /// Multiplies the accumulator by the word size.
    fn scale(&mut self) {
        self.emit(OpCode::Push);
        self.emit_arg(OpCode::LoadImmediate, Type::Pointer.size());
        self.emit(OpCode::Multiply);
    }

    /// Scales the left operand of an addition whose right operand turned out to be a pointer.
    ///
    /// The left operand is in the accumulator when the `PUSH` at `push` executes, so the
    /// scaling goes right before it.
    fn scale_before(&mut self, push: usize) {
        let scaling = [
            Instruction::new(OpCode::Push),
            Instruction::with_arg(OpCode::LoadImmediate, Type::Pointer.size()),
            Instruction::new(OpCode::Multiply),
        ];

        self.target.insert(push, self.token.line, &scaling);

        if self.frame.max_target > push {
            self.frame.max_target += scaling.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Precedence;
    use crate::token::TokenKind;

    #[test]
    fn test_precedence_order() {
        assert!(Precedence::of(TokenKind::Mul) > Precedence::of(TokenKind::Add));
        assert!(Precedence::of(TokenKind::Add) > Precedence::of(TokenKind::Shl));
        assert!(Precedence::of(TokenKind::Lor) < Precedence::of(TokenKind::Land));
        assert!(Precedence::of(TokenKind::Assign) < Precedence::of(TokenKind::Cond));
        assert_eq!(Precedence::of(TokenKind::Brak), Precedence::Postfix);
        assert_eq!(Precedence::of(TokenKind::Semicolon), Precedence::None);
    }
}
