//! [Vm] for executing [bytecode programs](crate::bytecode::Program).
//!
//! The machine has an accumulator (`ax`), a program counter, and a stack of words addressed by
//! slot index through the stack pointer and the frame base pointer. See [memory] for the
//! address space.

mod console;
pub mod memory;

use std::convert::TryFrom;

use slog::{debug, o, trace, warn, Discard, Logger};

use crate::bytecode::Program;
use crate::compiler::Config;
use crate::error::RuntimeError;
use crate::event::{Event, EventDispatcher, EventListener};
use crate::instruction::{Instruction, OpCode};

pub use self::console::{BufferConsole, Callback, Console, LogConsole, StdConsole};
pub use self::memory::{Memory, HEAP_BASE, STACK_BASE};

/// Contains the registers of the virtual machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Index of the next instruction to be executed.
    pub pc: usize,

    /// Slot index of the top of the stack. The stack grows towards slot zero.
    pub sp: usize,

    /// Slot index of the current frame base.
    pub bp: usize,

    /// The accumulator.
    pub ax: i64,

    /// Number of instructions executed so far.
    pub cycle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Exited(i64),
}

pub struct Vm<C = LogConsole> {
    pub context: Context,
    code: Vec<Instruction>,
    data: Vec<u8>,
    entry: usize,
    memory: Memory,
    config: Config,
    console: C,
    status: Status,
    fault: Option<RuntimeError>,
    events: EventDispatcher,
    logger: Logger,
}

impl Vm<LogConsole> {
    pub fn new(program: &Program, config: &Config) -> Result<Vm<LogConsole>, RuntimeError> {
        Vm::with_console(program, config, LogConsole::default())
    }
}

impl<C: Console> Vm<C> {
    pub fn with_console(program: &Program, config: &Config, console: C) -> Result<Vm<C>, RuntimeError> {
        Vm::with_logger(program, config, console, None)
    }

    pub fn with_logger<L>(
        program: &Program,
        config: &Config,
        console: C,
        logger: L,
    ) -> Result<Vm<C>, RuntimeError>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("stage" => "execution"));

        let mut vm = Vm {
            context: Context::default(),
            code: program.code.clone(),
            data: program.data.clone(),
            entry: program.entry,
            memory: Memory::new(Vec::new(), 0, 0),
            config: config.clone(),
            console,
            status: Status::Running,
            fault: None,
            events: EventDispatcher::new(),
            logger,
        };

        vm.reset()?;

        Ok(vm)
    }

    /// Restores the initial state: fresh memory and the entry frame.
    ///
    /// The entry frame holds `EXIT`, `PUSH`, `argc` and `argv` followed by a return address that
    /// points one past the last instruction, so returning from the entry function halts the
    /// machine with the accumulator as the exit code.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        let slots = self.config.max_stack_size;

        self.memory = Memory::new(self.data.clone(), self.config.heap_size, slots);
        self.context = Context {
            pc: self.entry,
            sp: slots,
            bp: slots,
            ax: 0,
            cycle: 0,
        };
        self.status = Status::Running;
        self.fault = None;

        self.push(OpCode::Exit.code() as i64)?;
        self.push(OpCode::Push.code() as i64)?;
        self.push(0)?;
        self.push(0)?;
        self.push(self.code.len() as i64)?;

        debug!(self.logger, "initialized";
               "entry" => self.entry, "code" => self.code.len(), "data" => self.data.len());

        Ok(())
    }

    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.events.add_listener(listener);
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Current contents of the data segment.
    pub fn data(&self) -> &[u8] {
        self.memory.data()
    }

    /// The occupied part of the stack, starting from the top.
    pub fn stack_window(&self) -> &[i64] {
        let stack = self.memory.stack();
        &stack[self.context.sp.min(stack.len())..]
    }

    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.code.get(self.context.pc)
    }

    /// Runs until the program exits or an error occurs.
    pub fn run(&mut self) -> Result<i64, RuntimeError> {
        loop {
            if let Status::Exited(code) = self.step()? {
                return Ok(code);
            }
        }
    }

    /// Executes a single instruction.
    ///
    /// Once the program has exited this keeps returning the exit status, and once an error has
    /// occurred it keeps returning the error.
    pub fn step(&mut self) -> Result<Status, RuntimeError> {
        if let Some(ref err) = self.fault {
            return Err(err.clone());
        }

        if let Status::Exited(_) = self.status {
            return Ok(self.status);
        }

        match self.execute() {
            Ok(status) => {
                self.status = status;

                if let Status::Exited(code) = status {
                    debug!(self.logger, "exited"; "code" => code, "cycles" => self.context.cycle);
                    self.events.dispatch(Event::Exit { code });
                }

                Ok(status)
            }
            Err(err) => {
                debug!(self.logger, "aborted"; "error" => %err, "pc" => self.context.pc);
                self.fault = Some(err.clone());
                self.events.dispatch(Event::Fault { error: err.clone() });
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<Status, RuntimeError> {
        let pc = self.context.pc;

        let ins = match self.code.get(pc) {
            Some(ins) => *ins,
            None => return Ok(Status::Exited(self.context.ax)),
        };

        self.context.cycle += 1;

        if self.context.cycle > self.config.max_cycles {
            return Err(RuntimeError::CycleLimitExceeded(self.config.max_cycles));
        }

        trace!(self.logger, "step";
               "pc" => pc, "instruction" => %ins, "ax" => self.context.ax,
               "sp" => self.context.sp, "bp" => self.context.bp);

        if !self.events.is_empty() {
            self.events.dispatch(Event::Step {
                pc,
                instruction: ins,
            });
        }

        self.context.pc = pc + 1;

        let arg = || ins.arg.ok_or(RuntimeError::MissingArgument(ins.opcode));

        match ins.opcode {
            OpCode::LoadImmediate => self.context.ax = arg()?,
            OpCode::LoadEffectiveAddress => {
                self.context.ax = Memory::slot_address((self.context.bp as i64).wrapping_add(arg()?));
            }
            OpCode::Jump => self.context.pc = self.target(arg()?)?,
            OpCode::JumpZero => {
                if self.context.ax == 0 {
                    self.context.pc = self.target(arg()?)?;
                }
            }
            OpCode::JumpNotZero => {
                if self.context.ax != 0 {
                    self.context.pc = self.target(arg()?)?;
                }
            }
            OpCode::Call => {
                let target = self.target(arg()?)?;
                self.push(self.context.pc as i64)?;
                self.context.pc = target;
            }
            OpCode::NewFrame => {
                let locals = arg()?;
                self.push(self.context.bp as i64)?;
                self.context.bp = self.context.sp;
                self.move_sp(-locals)?;
            }
            OpCode::DropArguments => self.move_sp(arg()?)?,
            OpCode::Return => {
                self.context.sp = self.context.bp;
                let bp = self.pop()?;
                self.context.bp = usize::try_from(bp)
                    .ok()
                    .filter(|bp| *bp <= self.memory.stack().len())
                    .ok_or(RuntimeError::StackUnderflow)?;
                let ret = self.pop()?;
                self.context.pc = self.target(ret)?;
            }
            OpCode::LoadInt => self.context.ax = self.memory.read_word(self.context.ax)?,
            OpCode::LoadChar => self.context.ax = self.memory.read_byte(self.context.ax)? as i64,
            OpCode::StoreInt => {
                let addr = self.pop()?;
                self.memory.write_word(addr, self.context.ax)?;
            }
            OpCode::StoreChar => {
                let addr = self.pop()?;
                let byte = self.context.ax as u8;
                self.memory.write_byte(addr, byte)?;
                self.context.ax = byte as i64;
            }
            OpCode::Push => self.push(self.context.ax)?,
            op if op.is_binary_operator() => {
                let left = self.pop()?;
                self.context.ax = binary(op, left, self.context.ax, pc)?;
            }
            OpCode::Open | OpCode::Read | OpCode::Close => {
                warn!(self.logger, "unsupported system call"; "call" => %ins.opcode, "pc" => pc);
                self.context.ax = -1;
            }
            OpCode::Printf => self.printf(pc)?,
            OpCode::Malloc => {
                let size = self.slot(self.context.sp)?;
                self.context.ax = self.memory.allocate(size);
            }
            OpCode::Free => (),
            OpCode::Memset => {
                let ptr = self.argument(2)?;
                let value = self.argument(1)? as u8;
                let size = self.slot(self.context.sp)?;

                for offset in 0..size.max(0) {
                    self.memory.write_byte(ptr.wrapping_add(offset), value)?;
                }

                self.context.ax = ptr;
            }
            OpCode::Memcmp => {
                let a = self.argument(2)?;
                let b = self.argument(1)?;
                let size = self.slot(self.context.sp)?;

                self.context.ax = 0;

                for offset in 0..size.max(0) {
                    let x = self.memory.read_byte(a.wrapping_add(offset))? as i64;
                    let y = self.memory.read_byte(b.wrapping_add(offset))? as i64;

                    if x != y {
                        self.context.ax = x - y;
                        break;
                    }
                }
            }
            OpCode::Exit => {
                let code = match ins.arg {
                    Some(code) => code,
                    None => self.slot(self.context.sp)?,
                };

                return Ok(Status::Exited(code));
            }
            // Binary operators are handled above.
            _ => return Err(RuntimeError::UnknownOpCode(ins.opcode.code() as i64)),
        }

        Ok(Status::Running)
    }

    /// Prints the format string and arguments pushed for `printf`.
    ///
    /// The argument count is read from the `DARG` that follows the call.
    fn printf(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let count = match self.code.get(pc + 1) {
            Some(Instruction {
                opcode: OpCode::DropArguments,
                arg: Some(count),
            }) if *count > 0 => *count as usize,
            _ => return Err(RuntimeError::MissingArgumentCount { pc }),
        };

        // Arguments are pushed in order, so the format string is the deepest one.
        let format_slot = self.context.sp.saturating_add(count - 1);
        let format = self.slot(format_slot)?;
        let args = (1..count)
            .map(|i| self.slot(format_slot - i))
            .collect::<Result<Vec<_>, _>>()?;

        let format = self.memory.read_c_string(format)?;
        let rendered = render_format(&format, &args);
        let text = String::from_utf8_lossy(&rendered).into_owned();

        self.context.ax = rendered.len() as i64;
        self.console.print(&text);

        if !self.events.is_empty() {
            self.events.dispatch(Event::Output { text });
        }

        Ok(())
    }

    fn target(&self, target: i64) -> Result<usize, RuntimeError> {
        usize::try_from(target)
            .ok()
            .filter(|target| *target <= self.code.len())
            .ok_or(RuntimeError::InvalidJump(target))
    }

    fn slot(&self, slot: usize) -> Result<i64, RuntimeError> {
        self.memory
            .stack()
            .get(slot)
            .cloned()
            .ok_or(RuntimeError::StackUnderflow)
    }

    /// Reads the stack slot `offset` words above the top.
    fn argument(&self, offset: usize) -> Result<i64, RuntimeError> {
        self.slot(self.context.sp.saturating_add(offset))
    }

    fn push(&mut self, value: i64) -> Result<(), RuntimeError> {
        if self.context.sp == 0 {
            return Err(RuntimeError::StackOverflow);
        }

        let sp = self.context.sp - 1;
        let slot = self
            .memory
            .stack_mut()
            .get_mut(sp)
            .ok_or(RuntimeError::StackUnderflow)?;

        *slot = value;
        self.context.sp = sp;

        Ok(())
    }

    fn pop(&mut self) -> Result<i64, RuntimeError> {
        let value = self.slot(self.context.sp)?;
        self.context.sp += 1;
        Ok(value)
    }

    fn move_sp(&mut self, delta: i64) -> Result<(), RuntimeError> {
        let sp = (self.context.sp as i64).wrapping_add(delta);

        if sp < 0 {
            return Err(RuntimeError::StackOverflow);
        }

        if sp as usize > self.memory.stack().len() {
            return Err(RuntimeError::StackUnderflow);
        }

        self.context.sp = sp as usize;

        Ok(())
    }
}

fn binary(op: OpCode, left: i64, right: i64, pc: usize) -> Result<i64, RuntimeError> {
    let value = match op {
        OpCode::Or => left | right,
        OpCode::Xor => left ^ right,
        OpCode::And => left & right,
        OpCode::Equal => (left == right) as i64,
        OpCode::NotEqual => (left != right) as i64,
        OpCode::Less => (left < right) as i64,
        OpCode::Greater => (left > right) as i64,
        OpCode::LessEqual => (left <= right) as i64,
        OpCode::GreaterEqual => (left >= right) as i64,
        OpCode::ShiftLeft => left.wrapping_shl(right as u32),
        OpCode::ShiftRight => left.wrapping_shr(right as u32),
        OpCode::Add => left.wrapping_add(right),
        OpCode::Subtract => left.wrapping_sub(right),
        OpCode::Multiply => left.wrapping_mul(right),
        OpCode::Divide | OpCode::Modulo if right == 0 => {
            return Err(RuntimeError::DivisionByZero { pc })
        }
        OpCode::Divide => left.wrapping_div(right),
        OpCode::Modulo => left.wrapping_rem(right),
        other => return Err(RuntimeError::UnknownOpCode(other.code() as i64)),
    };

    Ok(value)
}

/// Expands `%d` and `%c` placeholders. A placeholder without a matching argument is kept as is.
fn render_format(format: &[u8], args: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.len());
    let mut args = args.iter();
    let mut bytes = format.iter().cloned().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'%' {
            out.push(byte);
            continue;
        }

        match bytes.peek().cloned() {
            Some(b'%') => {
                bytes.next();
                out.push(b'%');
            }
            Some(conversion @ b'd') | Some(conversion @ b'c') => {
                bytes.next();

                match args.next() {
                    Some(value) if conversion == b'd' => out.extend_from_slice(value.to_string().as_bytes()),
                    Some(value) => out.push(*value as u8),
                    None => out.extend_from_slice(&[b'%', conversion]),
                }
            }
            _ => out.push(b'%'),
        }
    }

    out
}
