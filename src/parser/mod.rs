//! Single-pass recursive descent parser that emits bytecode while it parses.
//!
//! There is no syntax tree. Expressions leave their value in the accumulator and lvalues are
//! recognized after the fact: a variable reference ends in a load instruction, which
//! assignments rewrite into a `PUSH` of the address and address-of removes altogether.

mod declaration;
mod expression;
mod statement;

use slog::{debug, o, trace, Discard, Logger};

use crate::compiler::CompileTarget;
use crate::error::{CompileError, Expected, SemanticError};
use crate::instruction::{Instruction, OpCode};
use crate::lexer::Lexer;
use crate::symbol_table::{Class, SymbolId, SymbolTable, Type};
use crate::token::{Token, TokenKind};

pub use self::expression::Precedence;

/// Bookkeeping for the function currently being compiled.
#[derive(Debug, Clone, Default)]
struct Frame {
    /// Slot offset base: parameters are numbered below it, locals above it.
    ibp: i64,
    /// The value assigned to the most recently declared local.
    next: i64,
    /// Largest jump target patched inside the function body.
    max_target: usize,
}

/// Result of a successful parse.
pub struct Compiled<T> {
    pub target: T,
    pub symbols: SymbolTable,
}

pub struct Parser<'s, T: CompileTarget> {
    lexer: Lexer<'s>,
    token: Token,
    symbols: SymbolTable,
    target: T,
    /// Type of the most recently compiled expression.
    ty: Type,
    frame: Frame,
    logger: Logger,
}

impl<'s, T: CompileTarget> Parser<'s, T> {
    pub fn new(lexer: Lexer<'s>) -> Result<Parser<'s, T>, CompileError> {
        Parser::with_logger(lexer, None)
    }

    pub fn with_logger<L>(mut lexer: Lexer<'s>, logger: L) -> Result<Parser<'s, T>, CompileError>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "compilation"));

        let token = lexer.next_token()?;

        Ok(Parser {
            lexer,
            token,
            symbols: SymbolTable::new(),
            target: T::create(),
            ty: Type::Int,
            frame: Frame::default(),
            logger,
        })
    }

    /// Compiles the whole translation unit.
    pub fn parse(mut self) -> Result<Compiled<T>, CompileError> {
        while self.token.kind != TokenKind::Eof {
            self.declaration()?;
        }

        let entry = match self.symbols.resolve("main") {
            Some(id) if self.symbols.symbol(id).binding.class == Class::Function => {
                self.symbols.symbol(id).binding.value as usize
            }
            _ => {
                debug!(self.logger, "no main function, emitting an exit stub");
                let entry = self.emit_arg(OpCode::LoadImmediate, 0);
                self.emit(OpCode::Push);
                self.emit(OpCode::Exit);
                entry
            }
        };

        let data = self.lexer.into_data().into_bytes();

        Ok(Compiled {
            target: self.target.finish(data, entry),
            symbols: self.symbols,
        })
    }

    /// Replaces the lookahead with the next token and returns the old one.
    fn advance(&mut self) -> Result<Token, CompileError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.token, next))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        if self.token.kind != kind {
            return Err(self.unexpected(kind));
        }

        self.advance()
    }

    fn expect_identifier(&mut self) -> Result<String, CompileError> {
        let token = self.expect(TokenKind::Id)?;
        Ok(token.name().to_string())
    }

    fn unexpected<E: Into<Expected>>(&self, expected: E) -> CompileError {
        CompileError::syntax(expected, self.token.kind, self.token.line, self.token.column)
    }

    fn semantic(&self, err: SemanticError) -> CompileError {
        CompileError::semantic(err, self.token.line, self.token.column)
    }

    fn undefined(&self, name: &str) -> CompileError {
        self.semantic(SemanticError::Undefined {
            name: name.to_string(),
            suggestion: self.symbols.suggest(name),
        })
    }

    /// Resolves `name` to a symbol that is in scope.
    fn resolve(&self, name: &str) -> Result<SymbolId, CompileError> {
        self.symbols.resolve(name).ok_or_else(|| self.undefined(name))
    }

    /// Index of the next instruction to be emitted.
    fn here(&self) -> usize {
        self.target.code().len()
    }

    fn push_instruction(&mut self, ins: Instruction) -> usize {
        let index = self.target.emit(self.token.line, ins);
        trace!(self.logger, "emit"; "index" => index, "instruction" => %ins);
        index
    }

    fn emit(&mut self, opcode: OpCode) -> usize {
        self.push_instruction(Instruction::new(opcode))
    }

    fn emit_arg(&mut self, opcode: OpCode, arg: i64) -> usize {
        self.push_instruction(Instruction::with_arg(opcode, arg))
    }

    /// Back-patches the jump at `index` to continue at `target`.
    fn patch(&mut self, index: usize, target: usize) {
        self.target.patch(index, target as i64);

        if target > self.frame.max_target {
            self.frame.max_target = target;
        }
    }

    fn last_opcode(&self) -> Option<OpCode> {
        self.target.code().last().map(|ins| ins.opcode)
    }

    /// Parses `int` or `char` followed by any number of `*`.
    fn parse_type(&mut self) -> Result<Type, CompileError> {
        let base = self.parse_base_type()?;
        Ok(base.pointer_to(self.parse_pointer_levels()?))
    }

    fn parse_base_type(&mut self) -> Result<Type, CompileError> {
        let base = match self.token.kind {
            TokenKind::Int => Type::Int,
            TokenKind::Char => Type::Char,
            _ => return Err(self.unexpected("type")),
        };

        self.advance()?;
        Ok(base)
    }

    fn parse_pointer_levels(&mut self) -> Result<usize, CompileError> {
        let mut levels = 0;

        while self.token.kind == TokenKind::Mul {
            self.advance()?;
            levels += 1;
        }

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::Program;
    use crate::compiler::{compile, SourceMap};
    use crate::error::{CompileError, CompileErrorKind, SemanticError};
    use crate::instruction::{Instruction, OpCode::*};
    use crate::symbol_table::{Class, Type};

    fn ops(source: &str) -> Vec<Instruction> {
        compile::<Program>(source).unwrap().code
    }

    fn i(op: crate::instruction::OpCode) -> Instruction {
        Instruction::new(op)
    }

    fn a(op: crate::instruction::OpCode, arg: i64) -> Instruction {
        Instruction::with_arg(op, arg)
    }

    fn semantic_error(source: &str) -> SemanticError {
        match compile::<Program>(source) {
            Err(CompileError {
                kind: CompileErrorKind::Semantic(err),
                ..
            }) => err,
            other => panic!("expected a semantic error, got {:?}", other),
        }
    }

    #[test]
    fn test_return_expression() {
        assert_eq!(
            ops("int main() { return 2 + 3 * 4; }"),
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 2),
                i(Push),
                a(LoadImmediate, 3),
                i(Push),
                a(LoadImmediate, 4),
                i(Multiply),
                i(Add),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_locals_and_assignment() {
        assert_eq!(
            ops("int main() { int a; char c; a = 5; c = a; }"),
            vec![
                a(NewFrame, 2),
                a(LoadEffectiveAddress, -1),
                i(Push),
                a(LoadImmediate, 5),
                i(StoreInt),
                a(LoadEffectiveAddress, -2),
                i(Push),
                a(LoadEffectiveAddress, -1),
                i(LoadInt),
                i(StoreChar),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_parameters_and_call() {
        let program = compile::<Program>(
            "int add(int x, int y) { return x + y; }\nint main() { return add(1, 2); }",
        )
        .unwrap();

        assert_eq!(
            program.code,
            vec![
                a(NewFrame, 0),
                a(LoadEffectiveAddress, 3),
                i(LoadInt),
                i(Push),
                a(LoadEffectiveAddress, 2),
                i(LoadInt),
                i(Add),
                i(Return),
                a(NewFrame, 0),
                a(LoadImmediate, 1),
                i(Push),
                a(LoadImmediate, 2),
                i(Push),
                a(Call, 0),
                a(DropArguments, 2),
                i(Return),
            ]
        );
        assert_eq!(program.entry, 8);
    }

    #[test]
    fn test_system_call() {
        let program = compile::<Program>("int main() { printf(\"hi\"); }").unwrap();

        assert_eq!(
            program.code,
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 0),
                i(Push),
                i(Printf),
                a(DropArguments, 1),
                i(Return),
            ]
        );
        assert_eq!(&program.data[..3], b"hi\0");
    }

    #[test]
    fn test_globals() {
        let program = compile::<Program>("int x; char *s; int main() { x = 1; return *s; }").unwrap();

        assert_eq!(program.data.len(), 16);
        assert_eq!(
            program.code,
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 0),
                i(Push),
                a(LoadImmediate, 1),
                i(StoreInt),
                a(LoadImmediate, 8),
                i(LoadInt),
                i(LoadInt),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_address_of_and_pointer_arithmetic() {
        assert_eq!(
            ops("int main() { int x; int *p; p = &x; p = p + 1; }"),
            vec![
                a(NewFrame, 2),
                a(LoadEffectiveAddress, -2),
                i(Push),
                a(LoadEffectiveAddress, -1),
                i(StoreInt),
                a(LoadEffectiveAddress, -2),
                i(Push),
                a(LoadEffectiveAddress, -2),
                i(LoadInt),
                i(Push),
                a(LoadImmediate, 1),
                i(Push),
                a(LoadImmediate, 8),
                i(Multiply),
                i(Add),
                i(StoreInt),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_integer_plus_pointer_scales_integer() {
        let map = compile::<SourceMap<Program>>("int main() { int *p; return *(1 + (0 ? p : p)); }")
            .unwrap();

        assert_eq!(
            map.compiled.code,
            vec![
                a(NewFrame, 1),
                a(LoadImmediate, 1),
                i(Push),
                a(LoadImmediate, 8),
                i(Multiply),
                i(Push),
                a(LoadImmediate, 0),
                a(JumpZero, 11),
                a(LoadEffectiveAddress, -1),
                i(LoadInt),
                a(Jump, 13),
                a(LoadEffectiveAddress, -1),
                i(LoadInt),
                i(Add),
                i(LoadInt),
                i(Return),
            ]
        );
        assert_eq!(map.lines().len(), map.compiled.code.len());
    }

    #[test]
    fn test_if_else_back_patching() {
        assert_eq!(
            ops("int main() { if (1) return 2; else return 3; }"),
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 1),
                a(JumpZero, 6),
                a(LoadImmediate, 2),
                i(Return),
                a(Jump, 8),
                a(LoadImmediate, 3),
                i(Return),
                // The else jump targets the end of the body.
                i(Return),
            ]
        );
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(
            ops("int main() { while (0) ; return 1; }"),
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 0),
                a(JumpZero, 4),
                a(Jump, 1),
                a(LoadImmediate, 1),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_short_circuit_and_ternary() {
        assert_eq!(
            ops("int main() { return 1 && 0 ? 5 : 6; }"),
            vec![
                a(NewFrame, 0),
                a(LoadImmediate, 1),
                a(JumpZero, 4),
                a(LoadImmediate, 0),
                a(JumpZero, 7),
                a(LoadImmediate, 5),
                a(Jump, 8),
                a(LoadImmediate, 6),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_postfix_increment() {
        assert_eq!(
            ops("int main() { int i; i++; }"),
            vec![
                a(NewFrame, 1),
                a(LoadEffectiveAddress, -1),
                i(Push),
                i(LoadInt),
                i(Push),
                a(LoadImmediate, 1),
                i(Add),
                i(StoreInt),
                i(Push),
                a(LoadImmediate, 1),
                i(Subtract),
                i(Return),
            ]
        );
    }

    #[test]
    fn test_enum_constants() {
        let compiled = crate::compiler::Session::default()
            .compile_to::<Program>("enum color { RED, GREEN = 5, BLUE };")
            .unwrap();

        let symbols = compiled.symbols;
        let blue = symbols.resolve("BLUE").map(|id| symbols.symbol(id).binding);

        assert_eq!(blue.map(|b| (b.class, b.ty, b.value)), Some((Class::EnumConstant, Type::Int, 6)));
    }

    #[test]
    fn test_no_main_fallback() {
        let program = compile::<Program>("int x;").unwrap();

        assert_eq!(
            program.code,
            vec![a(LoadImmediate, 0), i(Push), i(Exit)]
        );
        assert_eq!(program.entry, 0);
    }

    #[test]
    fn test_semantic_errors() {
        match semantic_error("int main() { return prinf(1); }") {
            SemanticError::Undefined { name, suggestion } => {
                assert_eq!(name, "prinf");
                assert_eq!(suggestion, Some("printf".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(
            semantic_error("int x; int x;"),
            SemanticError::Duplicate("x".to_string())
        );
        assert_eq!(
            semantic_error("int f; int f() { }"),
            SemanticError::ConflictingDeclaration("f".to_string())
        );
        assert_eq!(
            semantic_error("int main() { int a; int a; }"),
            SemanticError::Duplicate("a".to_string())
        );
        assert_eq!(
            semantic_error("int x; int main() { x(); }"),
            SemanticError::NotCallable("x".to_string())
        );
        assert_eq!(
            semantic_error("int main() { char c; return *c; }"),
            SemanticError::InvalidDereference
        );
        assert_eq!(
            semantic_error("int main() { return &1; }"),
            SemanticError::InvalidAddressOf
        );
        assert_eq!(
            semantic_error("int main() { int i; return i[0]; }"),
            SemanticError::InvalidIndex
        );
        assert_eq!(
            semantic_error("int main() { 1 = 2; }"),
            SemanticError::InvalidLvalue("=")
        );
        assert_eq!(
            semantic_error("int main() { int a[0]; }"),
            SemanticError::MalformedArraySize
        );
    }

    #[test]
    fn test_syntax_error_context() {
        let err = compile::<Program>("int main() {\n  return 1\n}").unwrap_err();

        match err.kind {
            CompileErrorKind::Syntax { .. } => (),
            ref other => panic!("expected a syntax error, got {:?}", other),
        }

        assert_eq!(err.line, 3);
        assert_eq!(err.context, vec!["in statement".to_string(), "in function `main`".to_string()]);
    }

    #[test]
    fn test_locals_are_out_of_scope_after_function() {
        match semantic_error("int f() { int tmp; return 0; }\nint main() { return tmp; }") {
            SemanticError::Undefined { name, .. } => assert_eq!(name, "tmp"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_source_map() {
        let map = compile::<SourceMap<Program>>("int main()\n{\n  return\n    7;\n}").unwrap();

        assert_eq!(map.compiled.code.len(), 3);
        assert_eq!(map.line(0), Some(2));
        assert_eq!(map.line(1), Some(4));
        assert_eq!(map.line(2), Some(4));
        assert_eq!(map.line(3), None);
    }
}
