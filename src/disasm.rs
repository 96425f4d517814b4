use std::fmt::{self, Write as _};

use crate::encoder;
use crate::error::{CodecError, RenderError};
use crate::instructions::{
    AddressMode, AddressRegister, ArithmeticOp, Condition, CopyDirection, Fields, Instruction, Register,
};

/// Hex grid of a code buffer: upper-case 4-byte groups, two per line.
pub fn render(bytes: &[u8]) -> Result<String, RenderError> {
    if bytes.len() % 4 != 0 {
        return Err(RenderError::Unaligned(bytes.len()));
    }
    let mut out = String::with_capacity(bytes.len() / 4 * 9);
    for (i, group) in bytes.chunks_exact(4).enumerate() {
        if i > 0 {
            out.push(if i % 2 == 1 { ' ' } else { '\n' });
        }
        for b in group {
            let _ = write!(out, "{b:02X}");
        }
    }
    Ok(out)
}

/// Inverse of [`render`]. Accepts any whitespace between groups and skips
/// lines starting with `#` or `*` (code names and comments in code files).
pub fn parse_text(text: &str) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.starts_with('#') || line.starts_with('*') {
            continue;
        }
        for group in line.split_whitespace() {
            let bad = || RenderError::BadGroup { line: line_no + 1, group: group.to_string() };
            if group.len() != 8 || !group.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(bad());
            }
            let word = u32::from_str_radix(group, 16).map_err(|_| bad())?;
            out.extend_from_slice(&word.to_be_bytes());
        }
    }
    Ok(out)
}

impl Instruction {
    /// Encoded form in the hex grid layout.
    pub fn as_text(&self) -> Result<String, CodecError> {
        let bytes = encoder::encode(self)?;
        // encoded lengths are whole lines
        Ok(render(&bytes).unwrap_or_default())
    }

    /// Tag byte as it appears on the wire.
    pub fn wire_tag(&self) -> u8 {
        let op = self.opcode();
        op.tag_with_pointer(self.pointer).unwrap_or(op.tag())
    }
}

/// One description per line, children indented under their opener.
pub fn describe_tree(nodes: &[Instruction]) -> String {
    let mut out = String::new();
    for node in nodes {
        describe_into(node, 0, &mut out);
    }
    out
}

fn describe_into(node: &Instruction, depth: usize, out: &mut String) {
    let _ = writeln!(out, "{:indent$}{node}", "", indent = depth * 2);
    for child in &node.children {
        describe_into(child, depth + 1, out);
    }
}

fn endif_prefix(endif: bool) -> &'static str {
    if endif {
        "(Apply Endif) "
    } else {
        ""
    }
}

fn times(repeat: u16) -> String {
    if repeat > 0 {
        format!(" {} times consecutively", u32::from(repeat) + 1)
    } else {
        String::new()
    }
}

fn gr(r: Register) -> String {
    format!("Gecko Register {}", r.index())
}

/// Address operand of the 4x family, e.g. `[gr3 + 0x80001000]`.
fn address_source(mode: AddressMode, register: Register, value: u32, rel: &str) -> String {
    let mut parts = Vec::new();
    if mode.contains(AddressMode::WITH_ADDRESS) {
        parts.push(rel.to_string());
    }
    if mode.contains(AddressMode::WITH_REGISTER) {
        parts.push(format!("gr{}", register.index()));
    }
    parts.push(format!("0x{value:08X}"));
    parts.join(" + ")
}

fn arithmetic(op: ArithmeticOp, dst: &str, src: &str) -> String {
    match op {
        ArithmeticOp::Add => format!("Add {src} to {dst}"),
        ArithmeticOp::Mul => format!("Multiply {dst} by {src}"),
        ArithmeticOp::Or => format!("OR {dst} with {src}"),
        ArithmeticOp::And => format!("AND {dst} with {src}"),
        ArithmeticOp::Xor => format!("XOR {dst} with {src}"),
        ArithmeticOp::ShiftLeft => format!("Shift {dst} left by {src} bits"),
        ArithmeticOp::ShiftRight => format!("Shift {dst} right by {src} bits"),
        ArithmeticOp::RotateLeft => format!("Rotate {dst} left by {src} bits"),
        ArithmeticOp::ArithmeticShiftRight => format!("Arithmetic shift {dst} right by {src} bits"),
        ArithmeticOp::FloatAdd => format!("Add {src} to {dst} as a float"),
        ArithmeticOp::FloatMul => format!("Multiply {dst} by {src} as a float"),
    }
}

fn status_prefix(condition: Condition) -> &'static str {
    match condition {
        Condition::IfTrue => "If the code execution status is true, ",
        Condition::IfFalse => "If the code execution status is false, ",
        Condition::Always => "",
    }
}

fn address_updates(base_high: u16, pointer_high: u16) -> String {
    let mut s = String::new();
    if base_high != 0 {
        let _ = write!(s, " Set the base address to {:08X}.", u32::from(base_high) << 16);
    }
    if pointer_high != 0 {
        let _ = write!(s, " Set the pointer address to {:08X}.", u32::from(pointer_high) << 16);
    }
    s
}

fn short_operand(r: Register, mask: u16, address: u32, rel: &str) -> String {
    if r == Register::ADDRESS {
        format!("the short at address (0x{address:08X} + the {rel})")
    } else {
        format!("({} & ~0x{mask:04X})", gr(r))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = self.address_register().name();
        write!(f, "({:02X}) ", self.wire_tag())?;
        match &self.fields {
            Fields::WriteByte { address, value, repeat } => {
                write!(f, "Write byte 0x{value:02X} to (0x{address:08X} + the {rel}){}", times(*repeat))
            }
            Fields::WriteShort { address, value, repeat } => {
                write!(f, "Write short 0x{value:04X} to (0x{address:08X} + the {rel}){}", times(*repeat))
            }
            Fields::WriteWord { address, value } => write!(f, "Write word 0x{value:08X} to 0x{address:08X} + the {rel}"),
            Fields::WriteString { address, data } => {
                write!(f, "Write {} bytes to 0x{address:08X} + the {rel}", data.len())
            }
            Fields::WriteSerial(s) => {
                write!(f, "Write {} 0x{:08X} to (0x{:08X} + the {rel})", s.size.name(), s.value, s.address)?;
                if s.repeat > 0 {
                    write!(
                        f,
                        "{}, incrementing the value by {} and the address by {} each iteration",
                        times(s.repeat),
                        s.value_step,
                        s.address_step
                    )?;
                }
                Ok(())
            }
            Fields::If32 { cmp, address, value, endif } => write!(
                f,
                "{}If the word at address (0x{address:08X} + the {rel}) is {} 0x{value:08X}:",
                endif_prefix(*endif),
                cmp.describe()
            ),
            Fields::If16 { cmp, address, value, mask, endif } => write!(
                f,
                "{}If the short at address (0x{address:08X} + the {rel}) & ~0x{mask:04X} is {} 0x{value:04X}:",
                endif_prefix(*endif),
                cmp.describe()
            ),
            Fields::AddressLoad { target, mode, register, value } => {
                let src = format!("the value at address [{}]", address_source(*mode, *register, *value, rel));
                write_address_update(f, *target, *mode, &src)
            }
            Fields::AddressSet { target, mode, register, value } => {
                let src = address_source(*mode, *register, *value, rel);
                let src = if mode.intersects(AddressMode::WITH_ADDRESS | AddressMode::WITH_REGISTER) {
                    format!("the value ({src})")
                } else {
                    format!("the value {src}")
                };
                write_address_update(f, *target, *mode, &src)
            }
            Fields::AddressStore { target, mode, register, value } => write!(
                f,
                "Store the {} at address [{}]",
                target.name(),
                address_source(*mode, *register, *value, rel)
            ),
            Fields::AddressGetNext { target, offset } => {
                write!(f, "Set the {} to be the next Gecko Code's address + {offset:04X}", target.name())
            }
            Fields::RepeatSet { count, block } => write!(
                f,
                "Store next code address and number of times to repeat ({count}) in b{}",
                block.index()
            ),
            Fields::RepeatExecute { block } => write!(
                f,
                "If NNNN stored in b{0} is > 0, it is decreased by 1 and the code handler jumps to the next code address stored in b{0}",
                block.index()
            ),
            Fields::Return { condition, block } => {
                let action = format!("jump to the next code address stored in b{} (NNNN in bP is not touched)", block.index());
                write!(f, "{}", capitalize(&format!("{}{action}", status_prefix(*condition))))
            }
            Fields::Goto { condition, offset } => {
                let action = format!("jump to (next line of code + {offset} lines)");
                write!(f, "{}", capitalize(&format!("{}{action}", status_prefix(*condition))))
            }
            Fields::Gosub { condition, offset, block } => {
                let action = format!(
                    "store the next code address in b{} and jump to (next line of code + {offset} lines)",
                    block.index()
                );
                write!(f, "{}", capitalize(&format!("{}{action}", status_prefix(*condition))))
            }
            Fields::RegisterSet { register, mode, value } => {
                let src = if mode.contains(AddressMode::WITH_ADDRESS) {
                    format!("(0x{value:08X} + the {rel})")
                } else {
                    format!("0x{value:08X}")
                };
                if mode.contains(AddressMode::ACCUMULATE) {
                    write!(f, "Add the value {src} to {}", gr(*register))
                } else {
                    write!(f, "Set {} to the value {src}", gr(*register))
                }
            }
            Fields::RegisterLoad { register, size, with_address, address } => {
                let src = if *with_address { format!("(0x{address:08X} + the {rel})") } else { format!("0x{address:08X}") };
                write!(f, "Set {} to the {} at address {src}", gr(*register), size.name())
            }
            Fields::RegisterStore { register, size, with_address, repeat, address } => {
                let dst = if *with_address { format!("[0x{address:08X} + the {rel}]") } else { format!("[0x{address:08X}]") };
                write!(f, "Store {}'s {} to {dst}{}", gr(*register), size.name(), times(*repeat))
            }
            Fields::RegisterOperateImmediate { register, op, deref_register, deref_value, value } => {
                let dst = if *deref_register { format!("[{}]", gr(*register)) } else { gr(*register) };
                let src = if *deref_value { format!("[{value:08X}]") } else { format!("{value:08X}") };
                f.write_str(&arithmetic(*op, &dst, &src))
            }
            Fields::RegisterOperate { register, other, op, deref_register, deref_value } => {
                let dst = if *deref_register { format!("[{}]", gr(*register)) } else { gr(*register) };
                let src = if *deref_value { format!("[{}]", gr(*other)) } else { gr(*other) };
                f.write_str(&arithmetic(*op, &dst, &src))
            }
            Fields::MemoryCopy { direction, size, register, other, offset } => {
                let ours = format!("[{}]", gr(*register));
                let theirs = if *other == Register::ADDRESS {
                    format!("(the {rel} + 0x{offset:08X})")
                } else {
                    format!("([{}] + 0x{offset:08X})", gr(*other))
                };
                let (from, to) = match direction {
                    CopyDirection::ToAddress => (ours, theirs),
                    CopyDirection::FromAddress => (theirs, ours),
                };
                write!(f, "Copy 0x{size:04X} bytes from {from} to {to}")
            }
            Fields::RegisterIf16 { cmp, address, register, other, mask, endif } => write!(
                f,
                "{}If {} is {} {}:",
                endif_prefix(*endif),
                short_operand(*register, *mask, *address, rel),
                cmp.describe(),
                short_operand(*other, *mask, *address, rel)
            ),
            Fields::CounterIf16 { cmp, value, mask, counter, reset_on_true, endif } => write!(
                f,
                "{}If (0x{value:08X} & ~0x{mask:04X}) is {} {counter}: (Resets counter if {})",
                endif_prefix(*endif),
                cmp.describe(),
                if *reset_on_true { "true" } else { "false" }
            ),
            Fields::AsmExecute { .. } => f.write_str("Execute the designated ASM once every pass"),
            Fields::AsmInsert { address, link, .. } => write!(
                f,
                "Inject ({}) the designated ASM at 0x{address:08X} + the {rel}",
                if *link { "bl / blr" } else { "b / b" }
            ),
            Fields::WriteBranch { address, destination } => {
                write!(f, "Write a translated branch at (0x{address:08X} + the {rel}) to 0x{destination:08X}")
            }
            Fields::Switch => f.write_str("Toggle the code execution status when reached (True <-> False)"),
            Fields::AddressRangeCheck { start, end, endif } => write!(
                f,
                "{}Check if 0x{:08X} <= {rel} < 0x{:08X}",
                endif_prefix(*endif),
                u32::from(*start) << 16,
                u32::from(*end) << 16
            ),
            Fields::Terminator { base_high, pointer_high } => write!(
                f,
                "Clear the code execution status.{}",
                address_updates(*base_high, *pointer_high)
            ),
            Fields::Endif { as_else, count, base_high, pointer_high } => {
                if *count == 1 {
                    f.write_str("(Apply Endif)")?;
                } else {
                    write!(f, "(Apply {count} Endifs)")?;
                }
                if *as_else {
                    f.write_str(" Inverse the code execution status (else)")?;
                }
                f.write_str(&address_updates(*base_high, *pointer_high))
            }
            Fields::Exit => f.write_str("Flag the end of the codelist, the codehandler exits"),
            Fields::AsmInsertXor { address, xor_count, checksum, .. } => write!(
                f,
                "Inject (b / b) the designated ASM at (0x{address:08X} + the {rel}) if the 16-bit value at the injection point (and {xor_count} additional values) XOR'ed equals 0x{checksum:04X}"
            ),
            Fields::BrainslugSearch { range_start, range_end, .. } => write!(
                f,
                "If the linear data search finds a match between addresses 0x{:08X} and 0x{:08X}, set the pointer address to the beginning of the match and run the encapsulated codes",
                u32::from(*range_start) << 16,
                u32::from(*range_end) << 16
            ),
        }
    }
}

fn write_address_update(f: &mut fmt::Formatter<'_>, target: AddressRegister, mode: AddressMode, src: &str) -> fmt::Result {
    if mode.contains(AddressMode::ACCUMULATE) {
        write!(f, "Add {src} to the {}", target.name())
    } else {
        write!(f, "Set the {} to {src}", target.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_layout() {
        let bytes: Vec<u8> = (0u8..16).collect();
        assert_eq!(render(&bytes).unwrap(), "00010203 04050607\n08090A0B 0C0D0E0F");
        assert_eq!(render(&bytes[..4]).unwrap(), "00010203");
        assert_eq!(render(&bytes[..12]).unwrap(), "00010203 04050607\n08090A0B");
        assert_eq!(render(&[]).unwrap(), "");
        assert_eq!(render(&bytes[..6]), Err(RenderError::Unaligned(6)));
    }

    #[test]
    fn parse_skips_comments_and_rejects_junk() {
        let text = "* Infinite health\n04001234 3F800000\n# by someone\n  C0000000 00000001  \n";
        assert_eq!(
            parse_text(text).unwrap(),
            vec![0x04, 0x00, 0x12, 0x34, 0x3F, 0x80, 0x00, 0x00, 0xC0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(
            parse_text("04001234 3F80000"),
            Err(RenderError::BadGroup { line: 1, group: "3F80000".into() })
        );
        assert!(parse_text("0400123G 00000000").is_err());
    }
}
