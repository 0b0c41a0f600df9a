//! The compiled artifact: instructions, the data segment and the entry index.

mod listing;
mod program;

pub use self::listing::{render, render_line};
pub use self::program::{DataSegment, Program, WORD_SIZE};
pub(crate) use self::program::padded_len;
