use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::opcode::Opcode;
use crate::payload;

/// Gecko register index (`gr0`..`gr15`, also used for block registers `b0`..`b15`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Register(u8);

impl Register {
    pub const COUNT: u8 = 16;
    /// Index 15 in a second-register slot means "the base/pointer address" instead.
    pub const ADDRESS: Register = Register(15);

    pub fn new(index: u8) -> Result<Self, CodecError> {
        Self::try_from(i64::from(index))
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    pub(crate) fn from_nibble(bits: u32) -> Self {
        Register((bits & 0xF) as u8)
    }
}

impl TryFrom<i64> for Register {
    type Error = CodecError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..i64::from(Self::COUNT)).contains(&value) {
            Ok(Register(value as u8))
        } else {
            Err(CodecError::InvalidRegister { value })
        }
    }
}

impl TryFrom<i32> for Register {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl TryFrom<u8> for Register {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Register> for u8 {
    fn from(r: Register) -> u8 {
        r.0
    }
}

/// Operation applied by the register-operate instructions (`86`/`88`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ArithmeticOp {
    Add = 0,
    Mul = 1,
    Or = 2,
    And = 3,
    Xor = 4,
    ShiftLeft = 5,
    ShiftRight = 6,
    RotateLeft = 7,
    ArithmeticShiftRight = 8,
    FloatAdd = 9,
    FloatMul = 10,
}

impl ArithmeticOp {
    pub const ALL: [ArithmeticOp; 11] = [
        ArithmeticOp::Add,
        ArithmeticOp::Mul,
        ArithmeticOp::Or,
        ArithmeticOp::And,
        ArithmeticOp::Xor,
        ArithmeticOp::ShiftLeft,
        ArithmeticOp::ShiftRight,
        ArithmeticOp::RotateLeft,
        ArithmeticOp::ArithmeticShiftRight,
        ArithmeticOp::FloatAdd,
        ArithmeticOp::FloatMul,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Result of `lhs <op> rhs` as the code handler computes it. Float variants
    /// reinterpret both operands as IEEE-754 singles.
    pub fn evaluate(self, lhs: u32, rhs: u32) -> u32 {
        match self {
            ArithmeticOp::Add => lhs.wrapping_add(rhs),
            ArithmeticOp::Mul => lhs.wrapping_mul(rhs),
            ArithmeticOp::Or => lhs | rhs,
            ArithmeticOp::And => lhs & rhs,
            ArithmeticOp::Xor => lhs ^ rhs,
            ArithmeticOp::ShiftLeft => lhs.checked_shl(rhs).unwrap_or(0),
            ArithmeticOp::ShiftRight => lhs.checked_shr(rhs).unwrap_or(0),
            ArithmeticOp::RotateLeft => lhs.rotate_left(rhs),
            ArithmeticOp::ArithmeticShiftRight => ((lhs as i32) >> rhs.min(31)) as u32,
            ArithmeticOp::FloatAdd => (f32::from_bits(lhs) + f32::from_bits(rhs)).to_bits(),
            ArithmeticOp::FloatMul => (f32::from_bits(lhs) * f32::from_bits(rhs)).to_bits(),
        }
    }
}

/// Comparison selected by bits 1..3 of a conditional opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
}

impl Comparison {
    pub(crate) const fn offset(self) -> u8 {
        match self {
            Comparison::Equal => 0,
            Comparison::NotEqual => 2,
            Comparison::GreaterThan => 4,
            Comparison::LessThan => 6,
        }
    }

    pub(crate) fn from_offset(offset: u8) -> Self {
        match offset & 0x6 {
            0 => Comparison::Equal,
            2 => Comparison::NotEqual,
            4 => Comparison::GreaterThan,
            _ => Comparison::LessThan,
        }
    }

    pub fn holds(self, lhs: u32, rhs: u32) -> bool {
        match self {
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs,
            Comparison::GreaterThan => lhs > rhs,
            Comparison::LessThan => lhs < rhs,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Comparison::Equal => "equal to",
            Comparison::NotEqual => "not equal to",
            Comparison::GreaterThan => "greater than",
            Comparison::LessThan => "lesser than",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueSize {
    Byte = 0,
    Short = 1,
    Word = 2,
}

impl ValueSize {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ValueSize::Byte),
            1 => Some(ValueSize::Short),
            2 => Some(ValueSize::Word),
            _ => None,
        }
    }

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn bytes(self) -> usize {
        match self {
            ValueSize::Byte => 1,
            ValueSize::Short => 2,
            ValueSize::Word => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueSize::Byte => "byte",
            ValueSize::Short => "short",
            ValueSize::Word => "word",
        }
    }
}

/// Execution-status condition of the flow-control opcodes (`64`/`66`/`68`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Condition {
    IfTrue = 0,
    IfFalse = 1,
    Always = 2,
}

impl Condition {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Condition::IfTrue),
            1 => Some(Condition::IfFalse),
            2 => Some(Condition::Always),
            _ => None,
        }
    }

    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Which of the two code-handler address registers an opcode targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressRegister {
    Base,
    Pointer,
}

impl AddressRegister {
    pub fn name(self) -> &'static str {
        match self {
            AddressRegister::Base => "base address",
            AddressRegister::Pointer => "pointer address",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyDirection {
    /// `8A`: from `[grN]` to the address operand.
    ToAddress,
    /// `8C`: from the address operand to `[grN]`.
    FromAddress,
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressMode: u32 {
const ACCUMULATE = 1 << 20; // add to the destination instead of replacing it
const WITH_ADDRESS = 1 << 16; // add the base/pointer address
const WITH_REGISTER = 1 << 12; // add grN
}
}

/// `08`: `repeat + 1` writes, stepping both the address and the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialWrite {
    pub address: u32,
    pub value: u32,
    pub size: ValueSize,
    pub repeat: u16,
    pub address_step: u16,
    pub value_step: u32,
}

impl SerialWrite {
    /// `(address, value)` for every write, in order.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        (0..=u32::from(self.repeat))
            .map(|i| {
                (
                    self.address.wrapping_add(i.wrapping_mul(u32::from(self.address_step))),
                    self.value.wrapping_add(i.wrapping_mul(self.value_step)),
                )
            })
            .collect()
    }
}

/// Opcode-specific operands. Each variant holds only what its wire layout has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fields {
    WriteByte { address: u32, value: u8, repeat: u16 },
    WriteShort { address: u32, value: u16, repeat: u16 },
    WriteWord { address: u32, value: u32 },
    WriteString { address: u32, data: Vec<u8> },
    WriteSerial(SerialWrite),
    If32 { cmp: Comparison, address: u32, value: u32, endif: bool },
    If16 { cmp: Comparison, address: u32, value: u16, mask: u16, endif: bool },
    AddressLoad { target: AddressRegister, mode: AddressMode, register: Register, value: u32 },
    AddressSet { target: AddressRegister, mode: AddressMode, register: Register, value: u32 },
    AddressStore { target: AddressRegister, mode: AddressMode, register: Register, value: u32 },
    AddressGetNext { target: AddressRegister, offset: u16 },
    RepeatSet { count: u16, block: Register },
    RepeatExecute { block: Register },
    Return { condition: Condition, block: Register },
    Goto { condition: Condition, offset: u16 },
    Gosub { condition: Condition, offset: u16, block: Register },
    RegisterSet { register: Register, mode: AddressMode, value: u32 },
    RegisterLoad { register: Register, size: ValueSize, with_address: bool, address: u32 },
    RegisterStore { register: Register, size: ValueSize, with_address: bool, repeat: u16, address: u32 },
    RegisterOperateImmediate {
        register: Register,
        op: ArithmeticOp,
        deref_register: bool,
        deref_value: bool,
        value: u32,
    },
    RegisterOperate {
        register: Register,
        other: Register,
        op: ArithmeticOp,
        deref_register: bool,
        deref_value: bool,
    },
    MemoryCopy { direction: CopyDirection, size: u16, register: Register, other: Register, offset: u32 },
    RegisterIf16 { cmp: Comparison, address: u32, register: Register, other: Register, mask: u16, endif: bool },
    CounterIf16 { cmp: Comparison, value: u16, mask: u16, counter: u16, reset_on_true: bool, endif: bool },
    AsmExecute { code: Vec<u8> },
    AsmInsert { address: u32, link: bool, code: Vec<u8> },
    WriteBranch { address: u32, destination: u32 },
    Switch,
    AddressRangeCheck { start: u16, end: u16, endif: bool },
    Terminator { base_high: u16, pointer_high: u16 },
    Endif { as_else: bool, count: u8, base_high: u16, pointer_high: u16 },
    Exit,
    AsmInsertXor { address: u32, xor_count: u8, checksum: u16, code: Vec<u8> },
    BrainslugSearch { range_start: u16, range_end: u16, pattern: Vec<u8> },
}

impl Fields {
    pub fn opcode(&self) -> Opcode {
        use AddressRegister::{Base, Pointer};
        match self {
            Fields::WriteByte { .. } => Opcode::WriteByte,
            Fields::WriteShort { .. } => Opcode::WriteShort,
            Fields::WriteWord { .. } => Opcode::WriteWord,
            Fields::WriteString { .. } => Opcode::WriteString,
            Fields::WriteSerial(_) => Opcode::WriteSerial,
            Fields::If32 { cmp, .. } => compare_family(Opcode::IfEqual32, *cmp),
            Fields::If16 { cmp, .. } => compare_family(Opcode::IfEqual16, *cmp),
            Fields::AddressLoad { target: Base, .. } => Opcode::BaseAddressLoad,
            Fields::AddressLoad { target: Pointer, .. } => Opcode::PointerAddressLoad,
            Fields::AddressSet { target: Base, .. } => Opcode::BaseAddressSet,
            Fields::AddressSet { target: Pointer, .. } => Opcode::PointerAddressSet,
            Fields::AddressStore { target: Base, .. } => Opcode::BaseAddressStore,
            Fields::AddressStore { target: Pointer, .. } => Opcode::PointerAddressStore,
            Fields::AddressGetNext { target: Base, .. } => Opcode::BaseAddressGetNext,
            Fields::AddressGetNext { target: Pointer, .. } => Opcode::PointerAddressGetNext,
            Fields::RepeatSet { .. } => Opcode::RepeatSet,
            Fields::RepeatExecute { .. } => Opcode::RepeatExecute,
            Fields::Return { .. } => Opcode::Return,
            Fields::Goto { .. } => Opcode::Goto,
            Fields::Gosub { .. } => Opcode::Gosub,
            Fields::RegisterSet { .. } => Opcode::RegisterSet,
            Fields::RegisterLoad { .. } => Opcode::RegisterLoad,
            Fields::RegisterStore { .. } => Opcode::RegisterStore,
            Fields::RegisterOperateImmediate { .. } => Opcode::RegisterOperateImmediate,
            Fields::RegisterOperate { .. } => Opcode::RegisterOperate,
            Fields::MemoryCopy { direction: CopyDirection::ToAddress, .. } => Opcode::MemoryCopyTo,
            Fields::MemoryCopy { direction: CopyDirection::FromAddress, .. } => Opcode::MemoryCopyFrom,
            Fields::RegisterIf16 { cmp, .. } => compare_family(Opcode::RegisterIfEqual16, *cmp),
            Fields::CounterIf16 { cmp, .. } => compare_family(Opcode::CounterIfEqual16, *cmp),
            Fields::AsmExecute { .. } => Opcode::AsmExecute,
            Fields::AsmInsert { link: false, .. } => Opcode::AsmInsert,
            Fields::AsmInsert { link: true, .. } => Opcode::AsmInsertLink,
            Fields::WriteBranch { .. } => Opcode::WriteBranch,
            Fields::Switch => Opcode::Switch,
            Fields::AddressRangeCheck { .. } => Opcode::AddressRangeCheck,
            Fields::Terminator { .. } => Opcode::Terminator,
            Fields::Endif { .. } => Opcode::Endif,
            Fields::Exit => Opcode::Exit,
            Fields::AsmInsertXor { .. } => Opcode::AsmInsertXor,
            Fields::BrainslugSearch { .. } => Opcode::BrainslugSearch,
        }
    }
}

fn compare_family(base: Opcode, cmp: Comparison) -> Opcode {
    let tag = base.tag() + cmp.offset();
    Opcode::resolve(tag).unwrap_or_else(|_| unreachable!("comparison family of {base:?} covers {tag:#04x}"))
}

/// One decoded Gecko code record, owning the records of its block if it opens one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub pointer: bool,
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Instruction>,
}

impl Instruction {
    /// Base-address-relative instruction with validated operand widths.
    pub fn new(fields: Fields) -> Result<Self, CodecError> {
        payload::check_fields(&fields)?;
        Ok(Instruction { pointer: false, fields, children: Vec::new() })
    }

    pub fn with_pointer(mut self, pointer: bool) -> Result<Self, CodecError> {
        if pointer && self.opcode().tag_with_pointer(true).is_none() {
            return Err(CodecError::structure(format!(
                "{:?} has no pointer-relative form",
                self.opcode()
            )));
        }
        self.pointer = pointer;
        Ok(self)
    }

    pub fn with_children(mut self, children: Vec<Instruction>) -> Result<Self, CodecError> {
        crate::encoder::check_children(self.opcode(), &children)?;
        self.children = children;
        Ok(self)
    }

    pub fn opcode(&self) -> Opcode {
        self.fields.opcode()
    }

    pub fn is_block(&self) -> bool {
        self.opcode().is_block()
    }

    /// Encoded size in bytes, children included.
    pub fn encoded_len(&self) -> usize {
        payload::record_len(&self.fields) + self.children.iter().map(Instruction::encoded_len).sum::<usize>()
    }

    /// Encoded size in 8-byte lines, children included.
    pub fn virtual_length(&self) -> usize {
        self.encoded_len() / payload::LINE
    }

    /// The address register the instruction's address operand is relative to.
    pub fn address_register(&self) -> AddressRegister {
        if self.pointer {
            AddressRegister::Pointer
        } else {
            AddressRegister::Base
        }
    }
}
