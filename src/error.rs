//! Error types for compilation and execution.

use std::fmt::{self, Display};

use itertools::Itertools;

use crate::instruction::OpCode;
use crate::token::TokenKind;

/// Errors produced by the [Lexer](crate::lexer::Lexer).
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    /// A character that cannot start any token. Only reported when strict lexing is enabled.
    UnexpectedCharacter(char),
}

impl Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexError::UnexpectedCharacter(ch) => write!(f, "unexpected character {:?}", ch),
        }
    }
}

/// Describes what the parser wanted to see when it encountered an unexpected token.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Token(TokenKind),
    Description(&'static str),
}

impl Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expected::Token(kind) => write!(f, "{}", kind),
            Expected::Description(desc) => write!(f, "{}", desc),
        }
    }
}

impl From<TokenKind> for Expected {
    fn from(kind: TokenKind) -> Expected {
        Expected::Token(kind)
    }
}

impl From<&'static str> for Expected {
    fn from(desc: &'static str) -> Expected {
        Expected::Description(desc)
    }
}

/// Errors about the meaning of an otherwise well-formed program.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticError {
    Undefined {
        name: String,
        /// A similarly named symbol that is in scope.
        suggestion: Option<String>,
    },
    Duplicate(String),
    ConflictingDeclaration(String),
    NotCallable(String),
    InvalidDereference,
    InvalidAddressOf,
    InvalidIndex,
    /// The left hand side of the operator is not assignable.
    InvalidLvalue(&'static str),
    MalformedArraySize,
}

impl Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SemanticError::Undefined { name, suggestion: Some(other) } => {
                write!(f, "undefined identifier `{}`, did you mean `{}`?", name, other)
            }
            SemanticError::Undefined { name, suggestion: None } => {
                write!(f, "undefined identifier `{}`", name)
            }
            SemanticError::Duplicate(name) => write!(f, "duplicate declaration of `{}`", name),
            SemanticError::ConflictingDeclaration(name) => {
                write!(f, "conflicting declaration of `{}`", name)
            }
            SemanticError::NotCallable(name) => write!(f, "`{}` is not a function", name),
            SemanticError::InvalidDereference => write!(f, "invalid dereference"),
            SemanticError::InvalidAddressOf => write!(f, "invalid address-of operand"),
            SemanticError::InvalidIndex => write!(f, "invalid index target"),
            SemanticError::InvalidLvalue(op) => write!(f, "invalid lvalue in `{}`", op),
            SemanticError::MalformedArraySize => write!(f, "malformed array size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    Lex(LexError),
    Syntax {
        expected: Expected,
        found: TokenKind,
    },
    Semantic(SemanticError),
}

impl Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileErrorKind::Lex(err) => Display::fmt(err, f),
            CompileErrorKind::Syntax { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            CompileErrorKind::Semantic(err) => Display::fmt(err, f),
        }
    }
}

/// A fatal error that aborted the compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub line: usize,
    pub column: usize,
    /// Name of the source file, if one was given.
    pub file: Option<String>,
    /// Innermost context first.
    pub context: Vec<String>,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, line: usize, column: usize) -> CompileError {
        CompileError {
            kind,
            line,
            column,
            file: None,
            context: Vec::new(),
        }
    }

    pub fn syntax<E: Into<Expected>>(expected: E, found: TokenKind, line: usize, column: usize) -> CompileError {
        CompileError::new(
            CompileErrorKind::Syntax {
                expected: expected.into(),
                found,
            },
            line,
            column,
        )
    }

    pub fn semantic(err: SemanticError, line: usize, column: usize) -> CompileError {
        CompileError::new(CompileErrorKind::Semantic(err), line, column)
    }

    pub fn with_file<S: Into<String>>(mut self, file: S) -> CompileError {
        self.file = Some(file.into());
        self
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }

        write!(f, "{}:{}: ", self.line, self.column)?;

        if !self.context.is_empty() {
            write!(f, "{}: ", self.context.iter().rev().join(": "))?;
        }

        Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for CompileError {}

/// Extension for attaching context to errors while they propagate up the parser.
pub trait ErrorExt {
    fn context<T: Into<String>>(self, ctx: T) -> Self;
}

impl<R> ErrorExt for Result<R, CompileError> {
    fn context<T: Into<String>>(mut self, ctx: T) -> Self {
        if let Err(ref mut err) = self {
            err.context.push(ctx.into());
        }

        self
    }
}

/// Errors that abort the execution of a program.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    StackOverflow,
    StackUnderflow,
    /// The address is outside of every mapped region.
    InvalidAddress(i64),
    /// A word access to the stack that is not aligned to a slot.
    MisalignedAccess(i64),
    /// The program counter left the code without returning from the entry frame.
    InvalidJump(i64),
    DivisionByZero {
        pc: usize,
    },
    UnknownOpCode(i64),
    /// An instruction that requires an argument has none.
    MissingArgument(OpCode),
    /// `printf` was not followed by the instruction that carries its argument count.
    MissingArgumentCount {
        pc: usize,
    },
    CycleLimitExceeded(u64),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuntimeError::StackOverflow => write!(f, "stack overflow"),
            RuntimeError::StackUnderflow => write!(f, "stack underflow"),
            RuntimeError::InvalidAddress(addr) => write!(f, "invalid memory address {:#x}", addr),
            RuntimeError::MisalignedAccess(addr) => {
                write!(f, "misaligned stack access at {:#x}", addr)
            }
            RuntimeError::InvalidJump(target) => write!(f, "invalid jump target {}", target),
            RuntimeError::DivisionByZero { pc } => write!(f, "division by zero at {}", pc),
            RuntimeError::UnknownOpCode(code) => write!(f, "unknown opcode {}", code),
            RuntimeError::MissingArgument(op) => write!(f, "{} requires an argument", op),
            RuntimeError::MissingArgumentCount { pc } => {
                write!(f, "printf at {} is not followed by an argument count", pc)
            }
            RuntimeError::CycleLimitExceeded(limit) => {
                write!(f, "cycle limit of {} exceeded, possible infinite loop", limit)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Any error produced while compiling or running a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl Error {
    /// The process-style exit code reported for this error.
    pub fn exit_code(&self) -> i64 {
        -1
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Error {
        Error::Compile(err)
    }
}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Error {
        Error::Runtime(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Compile(err) => write!(f, "compilation error: {}", err),
            Error::Runtime(err) => write!(f, "runtime error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Compile(err) => Some(err),
            Error::Runtime(err) => Some(err),
        }
    }
}

#[test]
fn test_context_is_rendered_outermost_first() {
    let result: Result<(), CompileError> = Err(CompileError::syntax(
        TokenKind::Semicolon,
        TokenKind::RightBrace,
        3,
        9,
    ));

    let err = result
        .context("in statement")
        .context("in function `main`")
        .unwrap_err()
        .with_file("main.c");

    assert_eq!(
        err.to_string(),
        "main.c:3:9: in function `main`: in statement: expected `;`, found `}`"
    );
}
