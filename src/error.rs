/// Raised by [`Opcode::resolve`](crate::opcode::Opcode::resolve) for tag bytes
/// outside the instruction set.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unknown opcode tag {0:#04x}")]
pub struct UnknownOpcode(pub u8);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown opcode tag {tag:#04x} at offset {offset:#x}")]
    UnknownOpcode { tag: u8, offset: usize },
    #[error("Unexpected end of stream at offset {offset:#x}{}", tag_suffix(.tag))]
    UnexpectedEndOfStream { offset: usize, tag: Option<u8> },
    #[error("Block opened by tag {tag:#04x} at offset {offset:#x} has no terminator")]
    UnterminatedBlock { tag: u8, offset: usize },
    #[error("Register index {value} is outside 0..16")]
    InvalidRegister { value: i64 },
    #[error("Field `{field}` cannot hold {value:#x}")]
    InvalidField { field: &'static str, value: u64 },
    #[error("Invalid instruction structure: {reason}")]
    InvalidStructure { reason: String },
    #[error("Blocks nested deeper than {limit} at offset {offset:#x}")]
    NestingTooDeep { offset: usize, limit: usize },
}

fn tag_suffix(tag: &Option<u8>) -> String {
    match tag {
        Some(t) => format!(" (tag {t:#04x})"),
        None => String::new(),
    }
}

impl CodecError {
    pub(crate) fn structure(reason: impl Into<String>) -> Self {
        CodecError::InvalidStructure { reason: reason.into() }
    }

    /// Byte offset of the failing record, when the error came out of a decode.
    pub fn offset(&self) -> Option<usize> {
        match self {
            CodecError::UnknownOpcode { offset, .. }
            | CodecError::UnexpectedEndOfStream { offset, .. }
            | CodecError::UnterminatedBlock { offset, .. }
            | CodecError::NestingTooDeep { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Byte length {0} is not a multiple of 4")]
    Unaligned(usize),
    #[error("Invalid hex group `{group}` on line {line}")]
    BadGroup { line: usize, group: String },
}
