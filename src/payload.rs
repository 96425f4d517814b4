//! Bit layouts of every opcode family.
//!
//! A record starts with a metadata word `M` (tag in the top byte) and an info
//! word `I`, both big-endian. Write-serial appends two more words; the
//! multi-line families append their raw payload padded to whole lines. Block
//! openers carry no payload of their own: their children follow.

use crate::decoder::Reader;
use crate::error::CodecError;
use crate::instructions::{
    AddressMode, AddressRegister, ArithmeticOp, Comparison, Condition, CopyDirection, Fields, Register, SerialWrite,
    ValueSize,
};
use crate::opcode::Opcode;

/// Alignment unit of the format.
pub const LINE: usize = 8;

/// 25 address bits: the low byte of the tag is address bit 24.
pub const ADDRESS_MASK: u32 = 0x01FF_FFFF;

const ENDIF_BIT: u32 = 1;
const COUNTER_RESET_BIT: u32 = 1 << 3;
const DEREF_REGISTER_BIT: u32 = 1 << 16;
const DEREF_VALUE_BIT: u32 = 1 << 17;
const WITH_ADDRESS_BIT: u32 = 1 << 16;
const ELSE_BIT: u32 = 1 << 20;

/// Bytes needed to hold `len` bytes in whole lines.
pub fn padded_len(len: usize) -> usize {
    (len + LINE - 1) / LINE * LINE
}

/// Lines needed to hold `len` bytes.
pub fn line_count(len: usize) -> usize {
    padded_len(len) / LINE
}

/// Size of the record itself, children excluded.
pub fn record_len(fields: &Fields) -> usize {
    match fields {
        Fields::WriteSerial(_) => 2 * LINE,
        Fields::WriteString { data, .. } => LINE + padded_len(data.len()),
        Fields::AsmExecute { code } | Fields::AsmInsert { code, .. } | Fields::AsmInsertXor { code, .. } => {
            LINE + padded_len(code.len())
        }
        Fields::BrainslugSearch { pattern, .. } => LINE + padded_len(pattern.len()),
        _ => LINE,
    }
}

fn invalid(field: &'static str, value: impl Into<u64>) -> CodecError {
    CodecError::InvalidField { field, value: value.into() }
}

fn check_address(address: u32) -> Result<(), CodecError> {
    if address & !ADDRESS_MASK != 0 {
        return Err(invalid("address", address));
    }
    Ok(())
}

/// Conditional opcodes keep the endif flag in address bit 0.
fn check_conditional_address(address: u32) -> Result<(), CodecError> {
    check_address(address)?;
    if address & ENDIF_BIT != 0 {
        return Err(invalid("address", address));
    }
    Ok(())
}

/// Raw payloads are whole lines on the wire.
fn check_lines(field: &'static str, len: usize, max_lines: usize) -> Result<(), CodecError> {
    if len % LINE != 0 || line_count(len) > max_lines {
        return Err(invalid(field, len as u64));
    }
    Ok(())
}

/// Only the defined flags may be set, minus those the opcode has no room for.
fn check_mode(mode: AddressMode, unsupported: AddressMode) -> Result<(), CodecError> {
    if mode.bits() & !AddressMode::all().bits() != 0 || mode.intersects(unsupported) {
        return Err(invalid("mode", mode.bits()));
    }
    Ok(())
}

/// Reject operands that do not fit their wire fields.
pub fn check_fields(fields: &Fields) -> Result<(), CodecError> {
    match fields {
        Fields::WriteByte { address, .. }
        | Fields::WriteShort { address, .. }
        | Fields::WriteWord { address, .. }
        | Fields::WriteBranch { address, .. } => check_address(*address),
        Fields::WriteString { address, data } => {
            check_address(*address)?;
            if u32::try_from(data.len()).is_err() {
                return Err(invalid("data", data.len() as u64));
            }
            Ok(())
        }
        Fields::WriteSerial(s) => {
            check_address(s.address)?;
            if s.repeat > 0xFFF {
                return Err(invalid("repeat", s.repeat));
            }
            Ok(())
        }
        Fields::If32 { address, .. } | Fields::If16 { address, .. } | Fields::RegisterIf16 { address, .. } => {
            check_conditional_address(*address)
        }
        Fields::AddressLoad { mode, .. } | Fields::AddressSet { mode, .. } => check_mode(*mode, AddressMode::empty()),
        Fields::AddressStore { mode, .. } => check_mode(*mode, AddressMode::ACCUMULATE),
        Fields::RegisterSet { mode, .. } => check_mode(*mode, AddressMode::WITH_REGISTER),
        Fields::RegisterStore { repeat, .. } if *repeat > 0xFFF => Err(invalid("repeat", *repeat)),
        Fields::AsmExecute { code } => check_lines("code", code.len(), u32::MAX as usize),
        Fields::AsmInsert { address, code, .. } => {
            check_address(*address)?;
            check_lines("code", code.len(), u32::MAX as usize)
        }
        Fields::AsmInsertXor { address, code, .. } => {
            check_address(*address)?;
            check_lines("code", code.len(), 0xFF)
        }
        Fields::BrainslugSearch { pattern, .. } => check_lines("pattern", pattern.len(), 0xFF),
        _ => Ok(()),
    }
}

fn nibble(bits: u32) -> Register {
    Register::from_nibble(bits)
}

fn bit(word: u32, mask: u32) -> bool {
    word & mask != 0
}

fn condition(meta: u32) -> Result<Condition, CodecError> {
    let code = (meta >> 20) & 0x3;
    Condition::from_code(code).ok_or(invalid("condition", code))
}

fn value_size(code: u32) -> Result<ValueSize, CodecError> {
    ValueSize::from_code(code).ok_or(invalid("size", code))
}

fn arithmetic(meta: u32) -> Result<ArithmeticOp, CodecError> {
    let code = ((meta >> 20) & 0xF) as u8;
    ArithmeticOp::from_code(code).ok_or(invalid("op", code))
}

fn target(op: Opcode) -> AddressRegister {
    if op.tag() >= Opcode::PointerAddressLoad.tag() {
        AddressRegister::Pointer
    } else {
        AddressRegister::Base
    }
}

fn comparison(op: Opcode, family: Opcode) -> Comparison {
    Comparison::from_offset(op.tag() - family.tag())
}

/// Decode the operands of one record. `meta` has already been consumed from `r`.
pub(crate) fn decode_fields(op: Opcode, meta: u32, r: &mut Reader<'_>) -> Result<Fields, CodecError> {
    let info = r.read_u32()?;
    let address = meta & ADDRESS_MASK;
    let fields = match op {
        // 00XXXXXX YYYY00ZZ
        Opcode::WriteByte => Fields::WriteByte { address, value: info as u8, repeat: (info >> 16) as u16 },
        // 02XXXXXX YYYYZZZZ
        Opcode::WriteShort => Fields::WriteShort { address, value: info as u16, repeat: (info >> 16) as u16 },
        // 04XXXXXX YYYYYYYY
        Opcode::WriteWord => Fields::WriteWord { address, value: info },
        // 06XXXXXX NNNNNNNN, then N bytes padded to a line
        Opcode::WriteString => {
            let len = info as usize;
            let data = r.read_bytes(len)?.to_vec();
            r.read_bytes(padded_len(len) - len)?;
            Fields::WriteString { address, data }
        }
        // 08XXXXXX YYYYYYYY TNNNZZZZ VVVVVVVV
        Opcode::WriteSerial => {
            let sub = r.read_u32()?;
            let value_step = r.read_u32()?;
            Fields::WriteSerial(SerialWrite {
                address,
                value: info,
                size: value_size(sub >> 28)?,
                repeat: ((sub >> 16) & 0xFFF) as u16,
                address_step: sub as u16,
                value_step,
            })
        }
        // 2TXXXXXX YYYYYYYY
        Opcode::IfEqual32 | Opcode::IfNotEqual32 | Opcode::IfGreaterThan32 | Opcode::IfLessThan32 => Fields::If32 {
            cmp: comparison(op, Opcode::IfEqual32),
            address: address & !ENDIF_BIT,
            value: info,
            endif: bit(meta, ENDIF_BIT),
        },
        // 2TXXXXXX MMMMYYYY
        Opcode::IfEqual16 | Opcode::IfNotEqual16 | Opcode::IfGreaterThan16 | Opcode::IfLessThan16 => Fields::If16 {
            cmp: comparison(op, Opcode::IfEqual16),
            address: address & !ENDIF_BIT,
            value: info as u16,
            mask: (info >> 16) as u16,
            endif: bit(meta, ENDIF_BIT),
        },
        // 4TTYZ00N XXXXXXXX
        Opcode::BaseAddressLoad | Opcode::PointerAddressLoad => Fields::AddressLoad {
            target: target(op),
            mode: AddressMode::from_bits_truncate(meta),
            register: nibble(meta),
            value: info,
        },
        Opcode::BaseAddressSet | Opcode::PointerAddressSet => Fields::AddressSet {
            target: target(op),
            mode: AddressMode::from_bits_truncate(meta),
            register: nibble(meta),
            value: info,
        },
        Opcode::BaseAddressStore | Opcode::PointerAddressStore => Fields::AddressStore {
            target: target(op),
            mode: AddressMode::from_bits_truncate(meta) - AddressMode::ACCUMULATE,
            register: nibble(meta),
            value: info,
        },
        // 4T00XXXX 00000000
        Opcode::BaseAddressGetNext | Opcode::PointerAddressGetNext => {
            Fields::AddressGetNext { target: target(op), offset: meta as u16 }
        }
        // 6000NNNN 0000000P
        Opcode::RepeatSet => Fields::RepeatSet { count: meta as u16, block: nibble(info) },
        Opcode::RepeatExecute => Fields::RepeatExecute { block: nibble(info) },
        // 64T00000 0000000P
        Opcode::Return => Fields::Return { condition: condition(meta)?, block: nibble(info) },
        // 66T0XXXX 00000000
        Opcode::Goto => Fields::Goto { condition: condition(meta)?, offset: meta as u16 },
        // 68T0XXXX 0000000P
        Opcode::Gosub => Fields::Gosub { condition: condition(meta)?, offset: meta as u16, block: nibble(info) },
        // 80SY000N XXXXXXXX
        Opcode::RegisterSet => Fields::RegisterSet {
            register: nibble(meta),
            mode: AddressMode::from_bits_truncate(meta) - AddressMode::WITH_REGISTER,
            value: info,
        },
        // 82UY000N XXXXXXXX
        Opcode::RegisterLoad => Fields::RegisterLoad {
            register: nibble(meta),
            size: value_size((meta >> 20) & 0x3)?,
            with_address: bit(meta, WITH_ADDRESS_BIT),
            address: info,
        },
        // 84UYZZZN XXXXXXXX
        Opcode::RegisterStore => Fields::RegisterStore {
            register: nibble(meta),
            size: value_size((meta >> 20) & 0x3)?,
            with_address: bit(meta, WITH_ADDRESS_BIT),
            repeat: ((meta >> 4) & 0xFFF) as u16,
            address: info,
        },
        // 86TY000N XXXXXXXX
        Opcode::RegisterOperateImmediate => Fields::RegisterOperateImmediate {
            register: nibble(meta),
            op: arithmetic(meta)?,
            deref_register: bit(meta, DEREF_REGISTER_BIT),
            deref_value: bit(meta, DEREF_VALUE_BIT),
            value: info,
        },
        // 88TY000N 0000000M
        Opcode::RegisterOperate => Fields::RegisterOperate {
            register: nibble(meta),
            other: nibble(info),
            op: arithmetic(meta)?,
            deref_register: bit(meta, DEREF_REGISTER_BIT),
            deref_value: bit(meta, DEREF_VALUE_BIT),
        },
        // 8AYYYYNM XXXXXXXX
        Opcode::MemoryCopyTo | Opcode::MemoryCopyFrom => Fields::MemoryCopy {
            direction: if op == Opcode::MemoryCopyTo { CopyDirection::ToAddress } else { CopyDirection::FromAddress },
            size: (meta >> 8) as u16,
            register: nibble(meta >> 4),
            other: nibble(meta),
            offset: info,
        },
        // ATXXXXXX NM00YYYY
        Opcode::RegisterIfEqual16
        | Opcode::RegisterIfNotEqual16
        | Opcode::RegisterIfGreaterThan16
        | Opcode::RegisterIfLessThan16 => Fields::RegisterIf16 {
            cmp: comparison(op, Opcode::RegisterIfEqual16),
            address: address & !ENDIF_BIT,
            register: nibble(info >> 24),
            other: nibble(info >> 28),
            mask: info as u16,
            endif: bit(meta, ENDIF_BIT),
        },
        // AT0VVVVZ YYYYXXXX
        Opcode::CounterIfEqual16
        | Opcode::CounterIfNotEqual16
        | Opcode::CounterIfGreaterThan16
        | Opcode::CounterIfLessThan16 => Fields::CounterIf16 {
            cmp: comparison(op, Opcode::CounterIfEqual16),
            value: info as u16,
            mask: (info >> 16) as u16,
            counter: (meta >> 4) as u16,
            reset_on_true: bit(meta, COUNTER_RESET_BIT),
            endif: bit(meta, ENDIF_BIT),
        },
        // C0000000 NNNNNNNN
        Opcode::AsmExecute => Fields::AsmExecute { code: read_lines(r, info)? },
        // C2XXXXXX NNNNNNNN
        Opcode::AsmInsert | Opcode::AsmInsertLink => {
            Fields::AsmInsert { address, link: op == Opcode::AsmInsertLink, code: read_lines(r, info)? }
        }
        // C6XXXXXX YYYYYYYY
        Opcode::WriteBranch => Fields::WriteBranch { address, destination: info },
        Opcode::Switch => Fields::Switch,
        // CE00000Z XXXXYYYY
        Opcode::AddressRangeCheck => {
            Fields::AddressRangeCheck { start: (info >> 16) as u16, end: info as u16, endif: bit(meta, ENDIF_BIT) }
        }
        // E0000000 XXXXYYYY
        Opcode::Terminator => Fields::Terminator { base_high: (info >> 16) as u16, pointer_high: info as u16 },
        // E2T000VV XXXXYYYY
        Opcode::Endif => Fields::Endif {
            as_else: bit(meta, ELSE_BIT),
            count: meta as u8,
            base_high: (info >> 16) as u16,
            pointer_high: info as u16,
        },
        Opcode::Exit => Fields::Exit,
        // F2XXXXXX YYZZZZNN
        Opcode::AsmInsertXor => Fields::AsmInsertXor {
            address,
            xor_count: (info >> 24) as u8,
            checksum: (info >> 8) as u16,
            code: read_lines(r, info & 0xFF)?,
        },
        // F60000NN XXXXYYYY
        Opcode::BrainslugSearch => Fields::BrainslugSearch {
            range_start: (info >> 16) as u16,
            range_end: info as u16,
            pattern: read_lines(r, meta & 0xFF)?,
        },
    };
    Ok(fields)
}

fn read_lines(r: &mut Reader<'_>, lines: u32) -> Result<Vec<u8>, CodecError> {
    let len = (lines as usize).checked_mul(LINE).ok_or(r.truncated())?;
    Ok(r.read_bytes(len)?.to_vec())
}

pub(crate) fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    out.resize(out.len() + padded_len(bytes.len()) - bytes.len(), 0);
}

fn flag(set: bool, mask: u32) -> u32 {
    if set {
        mask
    } else {
        0
    }
}

/// Append the record for `fields` (children excluded). Length fields are
/// derived from the payload, never stored.
pub(crate) fn encode_fields(fields: &Fields, pointer: bool, out: &mut Vec<u8>) -> Result<(), CodecError> {
    check_fields(fields)?;
    let op = fields.opcode();
    let tag = op
        .tag_with_pointer(pointer)
        .ok_or_else(|| CodecError::structure(format!("{op:?} has no pointer-relative form")))?;
    let head = u32::from(tag) << 24;
    let (meta, info) = match fields {
        Fields::WriteByte { address, value, repeat } => (*address, u32::from(*repeat) << 16 | u32::from(*value)),
        Fields::WriteShort { address, value, repeat } => (*address, u32::from(*repeat) << 16 | u32::from(*value)),
        Fields::WriteWord { address, value } => (*address, *value),
        Fields::WriteString { address, data } => (*address, data.len() as u32),
        Fields::WriteSerial(s) => (s.address, s.value),
        Fields::If32 { address, value, endif, .. } => (*address | flag(*endif, ENDIF_BIT), *value),
        Fields::If16 { address, value, mask, endif, .. } => {
            (*address | flag(*endif, ENDIF_BIT), u32::from(*mask) << 16 | u32::from(*value))
        }
        Fields::AddressLoad { mode, register, value, .. }
        | Fields::AddressSet { mode, register, value, .. }
        | Fields::AddressStore { mode, register, value, .. } => (mode.bits() | u32::from(register.index()), *value),
        Fields::AddressGetNext { offset, .. } => (u32::from(*offset), 0),
        Fields::RepeatSet { count, block } => (u32::from(*count), u32::from(block.index())),
        Fields::RepeatExecute { block } => (0, u32::from(block.index())),
        Fields::Return { condition, block } => (condition.code() << 20, u32::from(block.index())),
        Fields::Goto { condition, offset } => (condition.code() << 20 | u32::from(*offset), 0),
        Fields::Gosub { condition, offset, block } => {
            (condition.code() << 20 | u32::from(*offset), u32::from(block.index()))
        }
        Fields::RegisterSet { register, mode, value } => (mode.bits() | u32::from(register.index()), *value),
        Fields::RegisterLoad { register, size, with_address, address } => (
            size.code() << 20 | flag(*with_address, WITH_ADDRESS_BIT) | u32::from(register.index()),
            *address,
        ),
        Fields::RegisterStore { register, size, with_address, repeat, address } => (
            size.code() << 20
                | flag(*with_address, WITH_ADDRESS_BIT)
                | u32::from(*repeat) << 4
                | u32::from(register.index()),
            *address,
        ),
        Fields::RegisterOperateImmediate { register, op, deref_register, deref_value, value } => (
            u32::from(op.code()) << 20
                | flag(*deref_value, DEREF_VALUE_BIT)
                | flag(*deref_register, DEREF_REGISTER_BIT)
                | u32::from(register.index()),
            *value,
        ),
        Fields::RegisterOperate { register, other, op, deref_register, deref_value } => (
            u32::from(op.code()) << 20
                | flag(*deref_value, DEREF_VALUE_BIT)
                | flag(*deref_register, DEREF_REGISTER_BIT)
                | u32::from(register.index()),
            u32::from(other.index()),
        ),
        Fields::MemoryCopy { size, register, other, offset, .. } => (
            u32::from(*size) << 8 | u32::from(register.index()) << 4 | u32::from(other.index()),
            *offset,
        ),
        Fields::RegisterIf16 { address, register, other, mask, endif, .. } => (
            *address | flag(*endif, ENDIF_BIT),
            u32::from(other.index()) << 28 | u32::from(register.index()) << 24 | u32::from(*mask),
        ),
        Fields::CounterIf16 { value, mask, counter, reset_on_true, endif, .. } => (
            u32::from(*counter) << 4 | flag(*reset_on_true, COUNTER_RESET_BIT) | flag(*endif, ENDIF_BIT),
            u32::from(*mask) << 16 | u32::from(*value),
        ),
        Fields::AsmExecute { code } => (0, line_count(code.len()) as u32),
        Fields::AsmInsert { address, code, .. } => (*address, line_count(code.len()) as u32),
        Fields::WriteBranch { address, destination } => (*address, *destination),
        Fields::Switch | Fields::Exit => (0, 0),
        Fields::AddressRangeCheck { start, end, endif } => {
            (flag(*endif, ENDIF_BIT), u32::from(*start) << 16 | u32::from(*end))
        }
        Fields::Terminator { base_high, pointer_high } => (0, u32::from(*base_high) << 16 | u32::from(*pointer_high)),
        Fields::Endif { as_else, count, base_high, pointer_high } => (
            flag(*as_else, ELSE_BIT) | u32::from(*count),
            u32::from(*base_high) << 16 | u32::from(*pointer_high),
        ),
        Fields::AsmInsertXor { address, xor_count, checksum, code } => (
            *address,
            u32::from(*xor_count) << 24 | u32::from(*checksum) << 8 | line_count(code.len()) as u32,
        ),
        Fields::BrainslugSearch { range_start, range_end, pattern } => (
            line_count(pattern.len()) as u32,
            u32::from(*range_start) << 16 | u32::from(*range_end),
        ),
    };
    write_u32(out, head | meta);
    write_u32(out, info);
    match fields {
        Fields::WriteSerial(s) => {
            write_u32(out, s.size.code() << 28 | u32::from(s.repeat) << 16 | u32::from(s.address_step));
            write_u32(out, s.value_step);
        }
        Fields::WriteString { data, .. } => write_padded(out, data),
        Fields::AsmExecute { code } | Fields::AsmInsert { code, .. } | Fields::AsmInsertXor { code, .. } => {
            write_padded(out, code)
        }
        Fields::BrainslugSearch { pattern, .. } => write_padded(out, pattern),
        _ => {}
    }
    Ok(())
}
