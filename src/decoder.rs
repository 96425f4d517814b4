use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{CodecError, UnknownOpcode};
use crate::instructions::Instruction;
use crate::opcode::Opcode;
use crate::payload::{self, LINE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    pub max_depth: usize, // nested block openers allowed before NestingTooDeep
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// Big-endian cursor over a code list. Remembers the record being decoded so
/// truncation errors can point back at it.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    record: (usize, Option<u8>),
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0, record: (0, None) }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len()).ok_or(self.truncated())?;
        let bytes = self.bytes;
        let out = &bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Step back over bytes already read.
    pub fn unread(&mut self, len: usize) {
        self.pos = self.pos.saturating_sub(len);
    }

    pub(crate) fn truncated(&self) -> CodecError {
        let (offset, tag) = self.record;
        CodecError::UnexpectedEndOfStream { offset, tag }
    }

    fn begin_record(&mut self, tag: u8) {
        self.record = (self.pos, Some(tag));
    }
}

/// Decode a whole code list with the default options.
pub fn decode(bytes: &[u8]) -> Result<Vec<Instruction>, CodecError> {
    decode_with(bytes, &DecodeOptions::default())
}

pub fn decode_with(bytes: &[u8], opts: &DecodeOptions) -> Result<Vec<Instruction>, CodecError> {
    let mut r = Reader::new(bytes);
    let mut out = Vec::new();
    while !r.is_empty() {
        out.push(read_instruction(&mut r, opts, 0)?);
    }
    debug!(records = out.len(), bytes = bytes.len(), "decoded code list");
    Ok(out)
}

/// Decode the next instruction, and its block if it opens one.
pub fn read_instruction(r: &mut Reader<'_>, opts: &DecodeOptions, depth: usize) -> Result<Instruction, CodecError> {
    let offset = r.position();
    let tag = r.peek_u8().ok_or(CodecError::UnexpectedEndOfStream { offset, tag: None })?;
    let op = Opcode::resolve(tag).map_err(|UnknownOpcode(tag)| CodecError::UnknownOpcode { tag, offset })?;
    r.begin_record(tag);
    let meta = r.read_u32()?;
    let fields = payload::decode_fields(op, meta, r)?;
    trace!(offset, tag, ?op, "record");

    let mut node = Instruction { pointer: Opcode::pointer_flag(tag), fields, children: Vec::new() };
    if op.is_block() {
        if depth >= opts.max_depth {
            return Err(CodecError::NestingTooDeep { offset, limit: opts.max_depth });
        }
        node.children = read_block(r, opts, depth + 1, tag, offset)?;
    }
    Ok(node)
}

/// Children of the opener at `offset`: everything up to the next sentinel.
/// The sentinel is pushed back so every enclosing block sees it too.
fn read_block(
    r: &mut Reader<'_>,
    opts: &DecodeOptions,
    depth: usize,
    tag: u8,
    offset: usize,
) -> Result<Vec<Instruction>, CodecError> {
    let mut children = Vec::new();
    loop {
        if r.is_empty() {
            return Err(CodecError::UnterminatedBlock { tag, offset });
        }
        let child = read_instruction(r, opts, depth)?;
        if child.opcode().is_sentinel() {
            r.unread(LINE);
            debug!(offset, tag, children = children.len(), depth, "block closed");
            return Ok(children);
        }
        children.push(child);
    }
}
