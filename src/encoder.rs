use tracing::{debug, trace};

use crate::error::CodecError;
use crate::instructions::Instruction;
use crate::opcode::Opcode;
use crate::payload;

/// Encode one instruction and its block. Length fields and padding are derived
/// from the payloads, so a tree edited in place always re-encodes consistently.
pub fn encode(node: &Instruction) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(node.encoded_len());
    encode_into(node, &mut out)?;
    Ok(out)
}

pub fn encode_into(node: &Instruction, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let op = node.opcode();
    check_children(op, &node.children)?;
    let start = out.len();
    payload::encode_fields(&node.fields, node.pointer, out)?;
    trace!(offset = start, ?op, pointer = node.pointer, "record");
    for child in &node.children {
        encode_into(child, out)?;
    }
    Ok(())
}

/// Encode a top-level code list. Every top-level block must be closed by the
/// sentinel that follows it.
pub fn encode_all(nodes: &[Instruction]) -> Result<Vec<u8>, CodecError> {
    for (i, node) in nodes.iter().enumerate() {
        if !node.is_block() {
            continue;
        }
        let closed = nodes.get(i + 1).is_some_and(|next| next.opcode().is_sentinel());
        if !closed {
            return Err(CodecError::structure(format!(
                "{:?} at index {i} is not followed by a terminator or exit",
                node.opcode()
            )));
        }
    }
    let mut out = Vec::with_capacity(nodes.iter().map(Instruction::encoded_len).sum());
    for node in nodes {
        encode_into(node, &mut out)?;
    }
    debug!(records = nodes.len(), bytes = out.len(), "encoded code list");
    Ok(out)
}

/// Children only decode back to the same tree if they form one sentinel-closed
/// run: no sentinels inside, and a nested block only in last position.
pub(crate) fn check_children(op: Opcode, children: &[Instruction]) -> Result<(), CodecError> {
    if children.is_empty() {
        return Ok(());
    }
    if !op.is_block() {
        return Err(CodecError::structure(format!("{op:?} cannot own children")));
    }
    let last = children.len() - 1;
    for (i, child) in children.iter().enumerate() {
        let child_op = child.opcode();
        if child_op.is_sentinel() {
            return Err(CodecError::structure(format!("{child_op:?} cannot be a child of {op:?}")));
        }
        if child_op.is_block() && i != last {
            return Err(CodecError::structure(format!(
                "nested {child_op:?} must be the last child of {op:?}"
            )));
        }
    }
    Ok(())
}
