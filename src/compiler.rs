//! Compilation from C source to bytecode, and the session that runs it.

use slog::{debug, info, o, Discard, Logger};

use crate::bytecode::Program;
use crate::error::{CompileError, Error};
use crate::instruction::Instruction;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::symbol_table::{Class, SymbolTable};
use crate::vm::{Console, Vm};

pub use crate::parser::Compiled;

/// Defines an interface for a data structure into which bytecode can be compiled.
pub trait CompileTarget: Sized {
    /// Create an empty instance of itself.
    fn create() -> Self;

    /// Appends an instruction and returns its index.
    ///
    /// # Parameters
    /// - `line`: The line of the source code that produced the instruction.
    /// - `ins`: The instruction.
    fn emit(&mut self, line: usize, ins: Instruction) -> usize;

    /// Replaces the argument of the instruction at `index`.
    fn patch(&mut self, index: usize, arg: i64);

    /// The instructions emitted so far.
    fn code(&self) -> &[Instruction];

    fn last_mut(&mut self) -> Option<&mut Instruction>;

    /// Removes the most recently emitted instruction.
    fn retract(&mut self) -> Option<Instruction>;

    /// Inserts `code` before the instruction at `index`.
    ///
    /// Jumps that target an instruction after `index` are moved along with it.
    fn insert(&mut self, index: usize, line: usize, code: &[Instruction]);

    /// Finalize the compilation.
    /// The compiler will not modify the data structure after this.
    fn finish(self, data: Vec<u8>, entry: usize) -> Self;
}

impl CompileTarget for Program {
    fn create() -> Program {
        Program::default()
    }

    fn emit(&mut self, _line: usize, ins: Instruction) -> usize {
        self.code.push(ins);
        self.code.len() - 1
    }

    fn patch(&mut self, index: usize, arg: i64) {
        if let Some(ins) = self.code.get_mut(index) {
            ins.arg = Some(arg);
        }
    }

    fn code(&self) -> &[Instruction] {
        &self.code
    }

    fn last_mut(&mut self) -> Option<&mut Instruction> {
        self.code.last_mut()
    }

    fn retract(&mut self) -> Option<Instruction> {
        self.code.pop()
    }

    fn insert(&mut self, index: usize, _line: usize, code: &[Instruction]) {
        let shift = code.len() as i64;

        for ins in self.code.iter_mut().filter(|ins| ins.opcode.is_jump()) {
            if let Some(ref mut target) = ins.arg {
                if *target > index as i64 {
                    *target += shift;
                }
            }
        }

        let tail = self.code.split_off(index);
        self.code.extend_from_slice(code);
        self.code.extend(tail);
    }

    fn finish(mut self, data: Vec<u8>, entry: usize) -> Program {
        self.data = data;
        self.entry = entry;
        self
    }
}

/// Captures line number information produced during the compilation process
/// and produces a mapping from instruction indices into source line numbers.
#[derive(Debug, Clone)]
pub struct SourceMap<T: CompileTarget> {
    /// The actual artifact of the compilation.
    pub compiled: T,

    lines: Vec<usize>,
}

impl<T: CompileTarget> SourceMap<T> {
    /// Returns the source line of the instruction at `index`.
    pub fn line(&self, index: usize) -> Option<usize> {
        self.lines.get(index).cloned()
    }

    pub fn lines(&self) -> &[usize] {
        &self.lines
    }
}

impl<T: CompileTarget> CompileTarget for SourceMap<T> {
    fn create() -> Self {
        SourceMap {
            compiled: T::create(),
            lines: Vec::new(),
        }
    }

    fn emit(&mut self, line: usize, ins: Instruction) -> usize {
        let index = self.compiled.emit(line, ins);
        self.lines.truncate(index);
        self.lines.push(line);
        index
    }

    fn patch(&mut self, index: usize, arg: i64) {
        self.compiled.patch(index, arg);
    }

    fn code(&self) -> &[Instruction] {
        self.compiled.code()
    }

    fn last_mut(&mut self) -> Option<&mut Instruction> {
        self.compiled.last_mut()
    }

    fn retract(&mut self) -> Option<Instruction> {
        self.lines.pop();
        self.compiled.retract()
    }

    fn insert(&mut self, index: usize, line: usize, code: &[Instruction]) {
        self.compiled.insert(index, line, code);
        let tail = self.lines.split_off(index);
        self.lines.extend(std::iter::repeat(line).take(code.len()));
        self.lines.extend(tail);
    }

    fn finish(self, data: Vec<u8>, entry: usize) -> Self {
        SourceMap {
            compiled: self.compiled.finish(data, entry),
            lines: self.lines,
        }
    }
}

/// Options shared by the compiler and the virtual machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of word slots in the stack.
    pub max_stack_size: usize,
    /// Collect and log diagnostics about the compiled program.
    pub debug_mode: bool,
    /// Number of instructions after which execution is aborted.
    pub max_cycles: u64,
    /// Size of the heap `malloc` allocates from, in bytes.
    pub heap_size: usize,
    /// Reject characters that cannot start a token instead of ending the input there.
    pub strict_lexing: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_stack_size: 128 * 1024,
            debug_mode: false,
            max_cycles: 1_000_000,
            heap_size: 64 * 1024,
            strict_lexing: false,
        }
    }
}

impl Config {
    pub fn max_stack_size(mut self, slots: usize) -> Config {
        self.max_stack_size = slots;
        self
    }

    pub fn debug_mode(mut self, enabled: bool) -> Config {
        self.debug_mode = enabled;
        self
    }

    pub fn max_cycles(mut self, cycles: u64) -> Config {
        self.max_cycles = cycles;
        self
    }

    pub fn heap_size(mut self, bytes: usize) -> Config {
        self.heap_size = bytes;
        self
    }

    pub fn strict_lexing(mut self, enabled: bool) -> Config {
        self.strict_lexing = enabled;
        self
    }
}

/// Result of [Session::run].
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The value returned by `main`, or -1 if compilation or execution failed.
    pub exit_code: i64,
    /// The compiled program, if compilation succeeded.
    pub program: Option<Program>,
    pub error: Option<Error>,
    /// Collected when [Config::debug_mode] is enabled.
    pub diagnostics: Vec<String>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Compiles and runs programs with a fixed configuration.
#[derive(Debug, Clone)]
pub struct Session {
    config: Config,
    logger: Logger,
    file: Option<String>,
}

impl Default for Session {
    fn default() -> Session {
        Session::new(Config::default())
    }
}

impl Session {
    pub fn new(config: Config) -> Session {
        Session::with_logger(config, None)
    }

    pub fn with_logger<L>(config: Config, logger: L) -> Session
    where
        L: Into<Option<Logger>>,
    {
        Session {
            config,
            logger: logger.into().unwrap_or(Logger::root(Discard, o!())),
            file: None,
        }
    }

    /// Sets the file name reported in compilation errors.
    pub fn file<S: Into<String>>(mut self, name: S) -> Session {
        let name = name.into();
        self.logger = self.logger.new(o!("file" => name.clone()));
        self.file = Some(name);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        self.compile_to::<Program>(source).map(|compiled| compiled.target)
    }

    /// Compiles `source` into any [CompileTarget], keeping the final symbol table.
    pub fn compile_to<T: CompileTarget>(&self, source: &str) -> Result<Compiled<T>, CompileError> {
        let lexer = Lexer::with_logger(source, self.logger.clone()).strict(self.config.strict_lexing);

        Parser::with_logger(lexer, self.logger.clone())
            .and_then(|parser| parser.parse())
            .map_err(|err| match self.file {
                Some(ref file) => err.with_file(file.as_str()),
                None => err,
            })
    }

    /// Executes an already compiled program.
    pub fn execute<C: Console>(&self, program: &Program, console: C) -> Result<i64, Error> {
        let mut vm = Vm::with_logger(program, &self.config, console, self.logger.clone())?;
        Ok(vm.run()?)
    }

    /// Compiles and runs `source`. Failures are reported in the [Outcome] with exit code -1.
    pub fn run<C: Console>(&self, source: &str, console: C) -> Outcome {
        let compiled = match self.compile_to::<Program>(source) {
            Ok(compiled) => compiled,
            Err(err) => {
                info!(self.logger, "compilation failed"; "error" => %err);
                let err = Error::from(err);

                return Outcome {
                    exit_code: err.exit_code(),
                    program: None,
                    error: Some(err),
                    diagnostics: Vec::new(),
                };
            }
        };

        self.run_compiled(compiled, console)
    }

    /// Runs a program compiled by [Session::compile_to], reporting like [Session::run].
    pub fn run_compiled<C: Console>(&self, compiled: Compiled<Program>, console: C) -> Outcome {
        let diagnostics = if self.config.debug_mode {
            self.diagnostics(&compiled.target, &compiled.symbols)
        } else {
            Vec::new()
        };

        let program = compiled.target;

        match self.execute(&program, console) {
            Ok(exit_code) => {
                debug!(self.logger, "program exited"; "code" => exit_code);

                Outcome {
                    exit_code,
                    program: Some(program),
                    error: None,
                    diagnostics,
                }
            }
            Err(err) => {
                info!(self.logger, "execution failed"; "error" => %err);

                Outcome {
                    exit_code: err.exit_code(),
                    program: Some(program),
                    error: Some(err),
                    diagnostics,
                }
            }
        }
    }

    fn diagnostics(&self, program: &Program, symbols: &SymbolTable) -> Vec<String> {
        let mut lines = vec![
            format!("code length: {}", program.code.len()),
            format!("data length: {}", program.data.len()),
            format!("entry: {}", program.entry),
            format!("symbols: {}", symbols.len()),
        ];

        let defined = symbols.iter().filter(|sym| match sym.binding.class {
            Class::Function | Class::Global | Class::EnumConstant => true,
            _ => false,
        });

        for sym in defined {
            lines.push(format!(
                "symbol {}: {:?} {} = {}",
                sym.name, sym.binding.class, sym.binding.ty, sym.binding.value
            ));
        }

        for line in &lines {
            info!(self.logger, "{}", line);
        }

        lines
    }
}

/// Compiles the given C source into bytecode.
/// Supports compilation into multiple data structures, but most often the compilation target is
/// [crate::bytecode::Program] possibly in combination with [SourceMap].
pub fn compile<T: CompileTarget>(source: &str) -> Result<T, CompileError> {
    compile_with_logger(source, None)
}

pub fn compile_with_logger<T, L>(source: &str, logger: L) -> Result<T, CompileError>
where
    T: CompileTarget,
    L: Into<Option<Logger>>,
{
    Session::with_logger(Config::default(), logger)
        .compile_to(source)
        .map(|compiled| compiled.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::BufferConsole;

    #[test]
    fn test_config_builder() {
        let config = Config::default().max_cycles(10).debug_mode(true).strict_lexing(true);

        assert_eq!(config.max_cycles, 10);
        assert!(config.debug_mode);
        assert!(config.strict_lexing);
        assert_eq!(config.max_stack_size, 128 * 1024);
        assert_eq!(config.heap_size, 64 * 1024);
    }

    #[test]
    fn test_run_reports_exit_code_and_program() {
        let mut console = BufferConsole::new();
        let outcome = Session::default().run("int main() { return 2 + 3 * 4; }", &mut console);

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code, 14);
        assert_eq!(outcome.program.map(|p| p.code.len()), Some(9));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_compile_error_is_reported_with_file() {
        let outcome = Session::default()
            .file("broken.c")
            .run("int main() { return }", BufferConsole::new());

        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.program.is_none());

        match outcome.error {
            Some(Error::Compile(err)) => assert_eq!(err.file.as_deref(), Some("broken.c")),
            other => panic!("expected a compilation error, got {:?}", other),
        }
    }

    #[test]
    fn test_runtime_error_keeps_program() {
        let outcome = Session::new(Config::default().max_cycles(100))
            .run("int main() { while (1) ; }", BufferConsole::new());

        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.program.is_some());
        assert!(matches!(
            outcome.error,
            Some(Error::Runtime(crate::error::RuntimeError::CycleLimitExceeded(100)))
        ));
    }

    #[test]
    fn test_run_compiled_program() {
        let session = Session::new(Config::default().debug_mode(true));
        let compiled = session
            .compile_to::<Program>("int main() { printf(\"x\"); return 5; }")
            .unwrap();
        let listing = compiled.target.listing();

        let mut console = BufferConsole::new();
        let outcome = session.run_compiled(compiled, &mut console);

        assert_eq!(outcome.exit_code, 5);
        assert_eq!(console.output, "x");
        assert_eq!(outcome.program.map(|program| program.listing()), Some(listing));
        assert_eq!(outcome.diagnostics[0], "code length: 7");
    }

    #[test]
    fn test_debug_diagnostics() {
        let outcome = Session::new(Config::default().debug_mode(true))
            .run("int x; int main() { return 0; }", BufferConsole::new());

        assert_eq!(outcome.diagnostics[0], "code length: 3");
        assert_eq!(outcome.diagnostics[1], "data length: 8");
        assert!(outcome.diagnostics.iter().any(|line| line.starts_with("symbol x: Global")));
    }
}
