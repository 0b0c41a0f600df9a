//! The flat address space seen by running programs.
//!
//! | Region | Addresses                                   |
//! |--------|---------------------------------------------|
//! | data   | `0 .. data.len()`                           |
//! | heap   | `HEAP_BASE .. HEAP_BASE + heap_size`        |
//! | stack  | `STACK_BASE .. STACK_BASE + 8 * slot_count` |
//!
//! The stack is a vector of words. Slot `i` lives at `STACK_BASE + 8 * i`, so word accesses to
//! the stack must be slot aligned. Byte accesses address the little-endian bytes of a slot.

use std::convert::TryFrom;

use crate::bytecode::WORD_SIZE;
use crate::error::RuntimeError;

pub const HEAP_BASE: i64 = 0x4000_0000;
pub const STACK_BASE: i64 = 0x8000_0000;

const WORD: i64 = WORD_SIZE as i64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Region {
    Data(usize),
    Heap(usize),
    /// Slot index and byte offset within the slot.
    Stack(usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    data: Vec<u8>,
    heap: Vec<u8>,
    /// Offset of the next free heap byte.
    heap_top: usize,
    stack: Vec<i64>,
}

impl Memory {
    pub fn new(data: Vec<u8>, heap_size: usize, stack_slots: usize) -> Memory {
        Memory {
            data,
            heap: vec![0; heap_size],
            heap_top: 0,
            stack: vec![0; stack_slots],
        }
    }

    /// Address of the stack slot `slot`.
    pub fn slot_address(slot: i64) -> i64 {
        STACK_BASE.wrapping_add(slot.wrapping_mul(WORD))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut [i64] {
        &mut self.stack
    }

    fn locate(&self, addr: i64, len: usize) -> Result<Region, RuntimeError> {
        let invalid = RuntimeError::InvalidAddress(addr);
        let within = |base: i64, size: usize| -> Option<usize> {
            let offset = usize::try_from(addr.checked_sub(base)?).ok()?;

            if offset.checked_add(len)? <= size {
                Some(offset)
            } else {
                None
            }
        };

        if let Some(offset) = within(0, self.data.len()) {
            return Ok(Region::Data(offset));
        }

        if let Some(offset) = within(HEAP_BASE, self.heap.len()) {
            return Ok(Region::Heap(offset));
        }

        if let Some(offset) = within(STACK_BASE, self.stack.len() * WORD_SIZE) {
            return Ok(Region::Stack(offset / WORD_SIZE, offset % WORD_SIZE));
        }

        Err(invalid)
    }

    fn bytes(&self, region: Region) -> Option<&[u8]> {
        match region {
            Region::Data(offset) => Some(&self.data[offset..]),
            Region::Heap(offset) => Some(&self.heap[offset..]),
            Region::Stack(..) => None,
        }
    }

    fn bytes_mut(&mut self, region: Region) -> Option<&mut [u8]> {
        match region {
            Region::Data(offset) => Some(&mut self.data[offset..]),
            Region::Heap(offset) => Some(&mut self.heap[offset..]),
            Region::Stack(..) => None,
        }
    }

    pub fn read_word(&self, addr: i64) -> Result<i64, RuntimeError> {
        match self.locate(addr, WORD_SIZE)? {
            Region::Stack(slot, 0) => Ok(self.stack[slot]),
            Region::Stack(..) => Err(RuntimeError::MisalignedAccess(addr)),
            region => {
                let mut word = [0; WORD_SIZE];
                let bytes = self.bytes(region).ok_or(RuntimeError::InvalidAddress(addr))?;
                word.copy_from_slice(&bytes[..WORD_SIZE]);
                Ok(i64::from_le_bytes(word))
            }
        }
    }

    pub fn write_word(&mut self, addr: i64, value: i64) -> Result<(), RuntimeError> {
        match self.locate(addr, WORD_SIZE)? {
            Region::Stack(slot, 0) => self.stack[slot] = value,
            Region::Stack(..) => return Err(RuntimeError::MisalignedAccess(addr)),
            region => {
                let bytes = self.bytes_mut(region).ok_or(RuntimeError::InvalidAddress(addr))?;
                bytes[..WORD_SIZE].copy_from_slice(&value.to_le_bytes());
            }
        }

        Ok(())
    }

    pub fn read_byte(&self, addr: i64) -> Result<u8, RuntimeError> {
        match self.locate(addr, 1)? {
            Region::Stack(slot, byte) => Ok(self.stack[slot].to_le_bytes()[byte]),
            region => self
                .bytes(region)
                .map(|bytes| bytes[0])
                .ok_or(RuntimeError::InvalidAddress(addr)),
        }
    }

    pub fn write_byte(&mut self, addr: i64, value: u8) -> Result<(), RuntimeError> {
        match self.locate(addr, 1)? {
            Region::Stack(slot, byte) => {
                let mut word = self.stack[slot].to_le_bytes();
                word[byte] = value;
                self.stack[slot] = i64::from_le_bytes(word);
            }
            region => {
                let bytes = self.bytes_mut(region).ok_or(RuntimeError::InvalidAddress(addr))?;
                bytes[0] = value;
            }
        }

        Ok(())
    }

    /// Reads a null-terminated string.
    pub fn read_c_string(&self, addr: i64) -> Result<Vec<u8>, RuntimeError> {
        let mut out = Vec::new();
        let mut cursor = addr;

        loop {
            match self.read_byte(cursor)? {
                0 => return Ok(out),
                byte => out.push(byte),
            }

            cursor = cursor.wrapping_add(1);
        }
    }

    /// Reserves `size` bytes of heap, rounded up to whole words.
    ///
    /// Returns the address of the block, or 0 when the heap is exhausted.
    pub fn allocate(&mut self, size: i64) -> i64 {
        let size = match usize::try_from(size) {
            Ok(size) => size,
            Err(_) => return 0,
        };

        let padded = match size.checked_add(WORD_SIZE - 1) {
            Some(n) => n / WORD_SIZE * WORD_SIZE,
            None => return 0,
        };

        if padded > self.heap.len() - self.heap_top {
            return 0;
        }

        let addr = HEAP_BASE + self.heap_top as i64;
        self.heap_top += padded;
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_words_and_bytes() {
        let mut memory = Memory::new(vec![0; 16], 0, 4);

        memory.write_word(8, 0x0102).unwrap();
        assert_eq!(memory.read_word(8), Ok(0x0102));
        assert_eq!(memory.read_byte(8), Ok(0x02));
        assert_eq!(memory.read_byte(9), Ok(0x01));

        // Words in the data segment need not be aligned.
        memory.write_word(3, -1).unwrap();
        assert_eq!(memory.read_byte(10), Ok(0xff));

        assert_eq!(memory.read_word(9), Err(RuntimeError::InvalidAddress(9)));
    }

    #[test]
    fn test_stack_slots() {
        let mut memory = Memory::new(Vec::new(), 0, 4);
        let slot = Memory::slot_address(2);

        memory.write_word(slot, 0x4142).unwrap();
        assert_eq!(memory.stack()[2], 0x4142);
        assert_eq!(memory.read_byte(slot + 1), Ok(0x41));

        memory.write_byte(slot, b'z').unwrap();
        assert_eq!(memory.read_word(slot), Ok(0x417a));

        assert_eq!(
            memory.read_word(slot + 4),
            Err(RuntimeError::MisalignedAccess(slot + 4))
        );
        assert_eq!(
            memory.read_word(Memory::slot_address(4)),
            Err(RuntimeError::InvalidAddress(Memory::slot_address(4)))
        );
    }

    #[test]
    fn test_bump_allocation() {
        let mut memory = Memory::new(Vec::new(), 32, 0);

        assert_eq!(memory.allocate(3), HEAP_BASE);
        assert_eq!(memory.allocate(8), HEAP_BASE + 8);
        assert_eq!(memory.allocate(17), 0);
        assert_eq!(memory.allocate(16), HEAP_BASE + 16);
        assert_eq!(memory.allocate(1), 0);
        assert_eq!(memory.allocate(-1), 0);

        memory.write_word(HEAP_BASE + 16, 7).unwrap();
        assert_eq!(memory.read_word(HEAP_BASE + 16), Ok(7));
    }

    #[test]
    fn test_c_string() {
        let memory = Memory::new(b"hi\0there".to_vec(), 0, 0);

        assert_eq!(memory.read_c_string(0), Ok(b"hi".to_vec()));
        assert_eq!(memory.read_c_string(3), Err(RuntimeError::InvalidAddress(8)));
    }
}
