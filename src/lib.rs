//! A compiler and virtual machine for a small subset of C.
//!
//! Currently this crate provides the functionality to:
//! - Tokenize C source with `int`, `char`, pointers, enums, `if`/`else`, `while` and functions.
//! - Compile it in a single pass into bytecode for a stack machine with an accumulator.
//! - Execute the bytecode with a handful of built-in system calls (`printf`, `malloc`, ...).
//! - Render an assembly listing of the bytecode.
//!
//! # Example
//! ```
//! use cpc::{
//!     compiler::{Config, Session},
//!     vm::BufferConsole,
//! };
//!
//! // Simple program that prints a greeting and returns a value.
//! let source = r#"
//!     int square(int x) { return x * x; }
//!
//!     int main() {
//!         printf("hello, world\n");
//!         return square(7);
//!     }
//! "#;
//!
//! let mut console = BufferConsole::new();
//!
//! // Compile and execute the program, collecting its output in memory.
//! let outcome = Session::new(Config::default()).run(source, &mut console);
//!
//! assert_eq!(outcome.exit_code, 49);
//! assert_eq!(console.output, "hello, world\n");
//!
//! // The listing shows every instruction prefixed with its index.
//! let listing = outcome.program.unwrap().listing();
//! assert!(listing.starts_with("(0) NVAR     0\n"));
//! ```
//!
//! # Executables
//!
//! ## `cpcrun`
//!
//! Compiles and runs a C source file, exiting with the value returned by `main`.
//! Built with the `cpcrun` feature.
//!
//! ```text
//! $ cpcrun hello.c --listing
//! (0) NVAR     0
//! (1) IMM      0
//! ...
//! hello, world
//! ```
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod event;
pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod symbol_table;
pub mod token;
pub mod vm;

pub use crate::bytecode::Program;
pub use crate::compiler::{compile, Config, Outcome, Session};
pub use crate::error::Error;
pub use crate::vm::Vm;
