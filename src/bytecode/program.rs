use crate::error::RuntimeError;
use crate::instruction::Instruction;

/// Size of a word in bytes. Globals, stack slots and pointer arithmetic all use this width.
pub const WORD_SIZE: usize = 8;

/// Byte-addressable data segment.
///
/// Globals occupy word-sized slots and string literals are stored null-terminated and padded to
/// the next word boundary, so every value placed here starts word-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSegment {
    bytes: Vec<u8>,
}

impl DataSegment {
    pub fn new() -> DataSegment {
        DataSegment::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Reserves `words` zeroed word slots and returns the address of the first one.
    pub fn reserve_words(&mut self, words: usize) -> usize {
        let address = self.bytes.len();
        self.bytes.resize(address + words * WORD_SIZE, 0);
        address
    }

    /// Appends a string literal and returns its address.
    pub fn push_str(&mut self, bytes: &[u8]) -> usize {
        let address = self.bytes.len();
        self.bytes.extend_from_slice(bytes);
        self.bytes.push(0);
        self.pad();
        address
    }

    fn pad(&mut self) {
        let len = padded_len(self.bytes.len());
        self.bytes.resize(len, 0);
    }
}

/// Rounds `len` up to the next word boundary.
pub(crate) fn padded_len(len: usize) -> usize {
    (len + WORD_SIZE - 1) / WORD_SIZE * WORD_SIZE
}

impl From<Vec<u8>> for DataSegment {
    fn from(mut bytes: Vec<u8>) -> DataSegment {
        let len = padded_len(bytes.len());
        bytes.resize(len, 0);
        DataSegment { bytes }
    }
}

/// A compiled program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// Instructions indexed by their address.
    pub code: Vec<Instruction>,

    /// Initial contents of the data segment.
    pub data: Vec<u8>,

    /// Index of the first instruction to execute.
    pub entry: usize,
}

impl Program {
    /// Encodes the instructions into a flat word stream.
    pub fn to_words(&self) -> Vec<i64> {
        let mut words = Vec::with_capacity(self.code.len() * 2);

        for ins in &self.code {
            ins.encode(&mut words);
        }

        words
    }

    /// Builds a program from an encoded word stream.
    ///
    /// `entry` is an instruction index, not a word offset.
    pub fn from_words(words: &[i64], data: Vec<u8>, entry: usize) -> Result<Program, RuntimeError> {
        let mut iter = words.iter().cloned();
        let mut code = Vec::new();

        while let Some(ins) = Instruction::decode(&mut iter)? {
            code.push(ins);
        }

        Ok(Program { code, data, entry })
    }

    /// Renders the assembly listing of the program.
    pub fn listing(&self) -> String {
        super::render(&self.code[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;

    #[test]
    fn test_string_padding() {
        let mut data = DataSegment::new();

        assert_eq!(data.push_str(b"Hello"), 0);
        assert_eq!(data.len(), 8);

        // Exactly seven bytes plus the terminator fill a word.
        assert_eq!(data.push_str(b"1234567"), 8);
        assert_eq!(data.len(), 16);

        assert_eq!(data.push_str(b"12345678"), 16);
        assert_eq!(data.len(), 32);
        assert_eq!(data.as_bytes()[24], 0);
    }

    #[test]
    fn test_reserve_words() {
        let mut data = DataSegment::new();
        data.push_str(b"ab");

        assert_eq!(data.reserve_words(1), 8);
        assert_eq!(data.reserve_words(3), 16);
        assert_eq!(data.len(), 40);
    }

    #[test]
    fn test_word_encoding() {
        let program = Program {
            code: vec![
                Instruction::with_arg(OpCode::NewFrame, 0),
                Instruction::with_arg(OpCode::LoadImmediate, 42),
                Instruction::new(OpCode::Return),
            ],
            data: Vec::new(),
            entry: 0,
        };

        let words = program.to_words();
        assert_eq!(words, vec![6, 0, 0, 42, 8]);

        let decoded = Program::from_words(&words, Vec::new(), 0).unwrap();
        assert_eq!(decoded, program);
    }
}
