use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::instructions::{Fields, Instruction};

/// Cached-memory mirror of the 25-bit code address space.
pub const CACHED_BASE: u32 = 0x8000_0000;

/// Executable image that preprocessable codes can be written into ahead of time.
pub trait PatchTarget {
    fn is_mapped(&self, address: u32) -> bool;
    fn seek(&mut self, address: u32);
    /// Write at the cursor and advance it.
    fn write(&mut self, bytes: &[u8]);
    fn insert_branch(&mut self, destination: u32, at: u32, link: bool);
}

/// Flat big-endian image starting at `base`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchImage {
    pub mem: Vec<u8>,
    pub base: u32,
    cursor: u32,
}

impl PatchImage {
    pub fn new(base: u32, size: usize) -> Self {
        Self { mem: vec![0; size], base, cursor: base }
    }

    fn offset(&self, address: u32) -> Option<usize> {
        let off = address.checked_sub(self.base)? as usize;
        (off < self.mem.len()).then_some(off)
    }

    pub fn read_u32(&self, address: u32) -> Option<u32> {
        let off = self.offset(address)?;
        let b = self.mem.get(off..off + 4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl PatchTarget for PatchImage {
    fn is_mapped(&self, address: u32) -> bool {
        self.offset(address).is_some()
    }

    fn seek(&mut self, address: u32) {
        self.cursor = address;
    }

    /// Bytes falling outside the image are dropped.
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if let Some(off) = self.offset(self.cursor) {
                self.mem[off] = b;
            }
            self.cursor = self.cursor.wrapping_add(1);
        }
    }

    /// PowerPC `b`/`bl` with a 24-bit word displacement.
    fn insert_branch(&mut self, destination: u32, at: u32, link: bool) {
        let disp = destination.wrapping_sub(at) & 0x03FF_FFFC;
        let insn = 0x4800_0000 | disp | u32::from(link);
        self.seek(at);
        self.write(&insn.to_be_bytes());
    }
}

/// Every copy lands on `address`; the address does not advance.
fn write_repeated<T: PatchTarget>(target: &mut T, address: u32, bytes: &[u8], repeat: u16) {
    for _ in 0..=repeat {
        target.seek(address);
        target.write(bytes);
    }
}

impl Instruction {
    /// Write a preprocessable code straight into `target`. Returns `false` when
    /// the opcode needs the code handler at runtime or the address is unmapped.
    /// Offsets are applied to [`CACHED_BASE`]; the base and pointer registers
    /// have no value before the handler runs.
    pub fn apply<T: PatchTarget>(&self, target: &mut T) -> bool {
        if !self.opcode().can_preprocess() {
            return false;
        }
        let address = match &self.fields {
            Fields::WriteByte { address, .. }
            | Fields::WriteShort { address, .. }
            | Fields::WriteWord { address, .. }
            | Fields::WriteString { address, .. }
            | Fields::WriteBranch { address, .. } => *address,
            Fields::WriteSerial(s) => s.address,
            _ => return false,
        };
        let address = CACHED_BASE | address;
        if !target.is_mapped(address) {
            return false;
        }
        trace!(address, op = ?self.opcode(), "apply");
        match &self.fields {
            Fields::WriteByte { value, repeat, .. } => write_repeated(target, address, &[*value], *repeat),
            Fields::WriteShort { value, repeat, .. } => write_repeated(target, address, &value.to_be_bytes(), *repeat),
            Fields::WriteWord { value, .. } => {
                target.seek(address);
                target.write(&value.to_be_bytes());
            }
            Fields::WriteString { data, .. } => {
                target.seek(address);
                target.write(data);
            }
            Fields::WriteSerial(s) => {
                let width = s.size.bytes();
                for (at, value) in s.writes() {
                    target.seek(CACHED_BASE | at);
                    target.write(&value.to_be_bytes()[4 - width..]);
                }
            }
            Fields::WriteBranch { destination, .. } => {
                target.insert_branch(*destination, address & !1, address & 1 != 0);
            }
            _ => unreachable!("address extracted above"),
        }
        true
    }
}
