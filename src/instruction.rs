//! Types for representing bytecode instructions and their parts.

use std::convert::TryFrom;
use std::fmt;

use crate::error::RuntimeError;

macro_rules! define_opcodes {
    ( $( $(#[$meta:meta])* $variant:ident = $code:literal, $mnemonic:literal; )* ) => {
        /// Instructions of the stack machine.
        ///
        /// The numeric codes are stable and match the order in which the instructions are listed.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $( $(#[$meta])* $variant, )*
        }

        impl OpCode {
            /// Every opcode ordered by its numeric code.
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$variant, )* ];

            /// Returns the numeric code of the opcode.
            pub fn code(self) -> u8 {
                match self {
                    $( OpCode::$variant => $code, )*
                }
            }

            /// Returns the assembly mnemonic of the opcode, eg. `"LEA"`.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }
        }

        impl TryFrom<u8> for OpCode {
            type Error = RuntimeError;

            fn try_from(code: u8) -> Result<OpCode, RuntimeError> {
                match code {
                    $( $code => Ok(OpCode::$variant), )*
                    other => Err(RuntimeError::UnknownOpCode(other as i64)),
                }
            }
        }
    };
}

define_opcodes! {
    /// Loads the argument into the accumulator.
    LoadImmediate = 0, "IMM";
    /// Loads the address of a frame slot relative to the base pointer.
    LoadEffectiveAddress = 1, "LEA";
    /// Unconditional jump.
    Jump = 2, "JMP";
    /// Jump if the accumulator is zero.
    JumpZero = 3, "JZ";
    /// Jump if the accumulator is not zero.
    JumpNotZero = 4, "JNZ";
    /// Pushes the return address and jumps to a function.
    Call = 5, "CALL";
    /// Sets up a new stack frame with space for the given number of local slots.
    NewFrame = 6, "NVAR";
    /// Drops the given number of arguments from the stack.
    DropArguments = 7, "DARG";
    /// Tears down the current frame and returns to the caller.
    Return = 8, "RET";
    /// Loads a word from the address in the accumulator.
    LoadInt = 9, "LI";
    /// Loads a byte from the address in the accumulator.
    LoadChar = 10, "LC";
    /// Pops an address and stores the accumulator there as a word.
    StoreInt = 11, "SI";
    /// Pops an address and stores the low byte of the accumulator there.
    StoreChar = 12, "SC";
    /// Pushes the accumulator to the stack.
    Push = 13, "PUSH";
    Or = 14, "OR";
    Xor = 15, "XOR";
    And = 16, "AND";
    Equal = 17, "EQ";
    NotEqual = 18, "NE";
    Less = 19, "LT";
    Greater = 20, "GT";
    LessEqual = 21, "LE";
    GreaterEqual = 22, "GE";
    ShiftLeft = 23, "SHL";
    ShiftRight = 24, "SHR";
    Add = 25, "ADD";
    Subtract = 26, "SUB";
    Multiply = 27, "MUL";
    Divide = 28, "DIV";
    Modulo = 29, "MOD";
    /// `open(path, flags)` system call.
    Open = 30, "OPEN";
    /// `read(fd, buf, n)` system call.
    Read = 31, "READ";
    /// `close(fd)` system call.
    Close = 32, "CLOS";
    /// `printf(fmt, ...)` system call.
    Printf = 33, "PRTF";
    /// `malloc(size)` system call.
    Malloc = 34, "MALC";
    /// `free(ptr)` system call.
    Free = 35, "FREE";
    /// `memset(ptr, value, size)` system call.
    Memset = 36, "MSET";
    /// `memcmp(a, b, size)` system call.
    Memcmp = 37, "MCMP";
    /// Terminates the program.
    Exit = 38, "EXIT";
}

impl OpCode {
    /// Returns true for the binary operators that pop their left operand from the stack.
    pub fn is_binary_operator(self) -> bool {
        let code = self.code();
        code >= OpCode::Or.code() && code <= OpCode::Modulo.code()
    }

    /// Returns true for the instructions whose argument is an instruction index to continue at.
    pub fn is_jump(self) -> bool {
        match self {
            OpCode::Jump | OpCode::JumpZero | OpCode::JumpNotZero => true,
            _ => false,
        }
    }

    /// Returns true for the opcodes that are emitted for built-in functions.
    pub fn is_system_call(self) -> bool {
        self.code() >= OpCode::Open.code()
    }

    /// Returns true for the instructions which carry an argument when emitted by the compiler.
    pub fn takes_argument(self) -> bool {
        self.code() <= OpCode::DropArguments.code()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// A single bytecode instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub arg: Option<i64>,
}

impl Instruction {
    pub fn new(opcode: OpCode) -> Instruction {
        Instruction { opcode, arg: None }
    }

    pub fn with_arg(opcode: OpCode, arg: i64) -> Instruction {
        Instruction {
            opcode,
            arg: Some(arg),
        }
    }

    /// Decodes a single instruction from a word stream.
    ///
    /// The argument word is consumed only for opcodes for which [OpCode::takes_argument] holds.
    pub fn decode<I>(words: &mut I) -> Result<Option<Instruction>, RuntimeError>
    where
        I: Iterator<Item = i64>,
    {
        let word = match words.next() {
            Some(word) => word,
            None => return Ok(None),
        };

        if word < 0 || word > u8::max_value() as i64 {
            return Err(RuntimeError::UnknownOpCode(word));
        }

        let opcode = OpCode::try_from(word as u8)?;

        if opcode.takes_argument() {
            let arg = words.next().ok_or(RuntimeError::MissingArgument(opcode))?;
            Ok(Some(Instruction::with_arg(opcode, arg)))
        } else {
            Ok(Some(Instruction::new(opcode)))
        }
    }

    /// Appends the word encoding of the instruction into `out`.
    ///
    /// Arguments attached to opcodes that don't take one are not encoded.
    pub fn encode(&self, out: &mut Vec<i64>) {
        out.push(self.opcode.code() as i64);

        if self.opcode.takes_argument() {
            out.push(self.arg.unwrap_or(0));
        }
    }
}

impl From<OpCode> for Instruction {
    fn from(opcode: OpCode) -> Instruction {
        Instruction::new(opcode)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:<8}", self.opcode.mnemonic())?;

        if let Some(arg) = self.arg {
            write!(f, " {}", arg)?;
        }

        Ok(())
    }
}

#[test]
fn test_opcode_codes_are_sequential() {
    assert_eq!(OpCode::ALL.len(), 39);

    for (i, op) in OpCode::ALL.iter().enumerate() {
        assert_eq!(op.code() as usize, i);
        assert_eq!(OpCode::try_from(i as u8).unwrap(), *op);
    }
}

#[test]
fn test_unknown_opcode() {
    match OpCode::try_from(39) {
        Err(RuntimeError::UnknownOpCode(39)) => (),
        other => panic!("expected an unknown opcode error, got {:?}", other),
    }
}

#[test]
fn test_instruction_display() {
    assert_eq!(
        Instruction::with_arg(OpCode::LoadImmediate, 14).to_string(),
        "IMM      14"
    );
    assert_eq!(Instruction::new(OpCode::Push).to_string(), "PUSH    ");
}

#[test]
fn test_decode_words() {
    let mut words = vec![0, 7, 13, 38].into_iter();

    assert_eq!(
        Instruction::decode(&mut words).unwrap(),
        Some(Instruction::with_arg(OpCode::LoadImmediate, 7))
    );
    assert_eq!(
        Instruction::decode(&mut words).unwrap(),
        Some(Instruction::new(OpCode::Push))
    );
    assert_eq!(
        Instruction::decode(&mut words).unwrap(),
        Some(Instruction::new(OpCode::Exit))
    );
    assert_eq!(Instruction::decode(&mut words).unwrap(), None);
}
