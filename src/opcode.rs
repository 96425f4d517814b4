use serde::{Deserialize, Serialize};

use crate::error::UnknownOpcode;

/// Tag bit selecting the pointer address register instead of the base address.
pub const POINTER_BIT: u8 = 0x10;

/// Every instruction of the Gecko code set. The discriminant is the canonical
/// tag byte (pointer bit and address bit 24 clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    WriteByte = 0x00,
    WriteShort = 0x02,
    WriteWord = 0x04,
    WriteString = 0x06,
    WriteSerial = 0x08,
    IfEqual32 = 0x20,
    IfNotEqual32 = 0x22,
    IfGreaterThan32 = 0x24,
    IfLessThan32 = 0x26,
    IfEqual16 = 0x28,
    IfNotEqual16 = 0x2A,
    IfGreaterThan16 = 0x2C,
    IfLessThan16 = 0x2E,
    BaseAddressLoad = 0x40,
    BaseAddressSet = 0x42,
    BaseAddressStore = 0x44,
    BaseAddressGetNext = 0x46,
    PointerAddressLoad = 0x48,
    PointerAddressSet = 0x4A,
    PointerAddressStore = 0x4C,
    PointerAddressGetNext = 0x4E,
    RepeatSet = 0x60,
    RepeatExecute = 0x62,
    Return = 0x64,
    Goto = 0x66,
    Gosub = 0x68,
    RegisterSet = 0x80,
    RegisterLoad = 0x82,
    RegisterStore = 0x84,
    RegisterOperateImmediate = 0x86,
    RegisterOperate = 0x88,
    MemoryCopyTo = 0x8A,
    MemoryCopyFrom = 0x8C,
    RegisterIfEqual16 = 0xA0,
    RegisterIfNotEqual16 = 0xA2,
    RegisterIfGreaterThan16 = 0xA4,
    RegisterIfLessThan16 = 0xA6,
    CounterIfEqual16 = 0xA8,
    CounterIfNotEqual16 = 0xAA,
    CounterIfGreaterThan16 = 0xAC,
    CounterIfLessThan16 = 0xAE,
    AsmExecute = 0xC0,
    AsmInsert = 0xC2,
    AsmInsertLink = 0xC4,
    WriteBranch = 0xC6,
    Switch = 0xCC,
    AddressRangeCheck = 0xCE,
    Terminator = 0xE0,
    Endif = 0xE2,
    Exit = 0xF0,
    AsmInsertXor = 0xF2,
    BrainslugSearch = 0xF6,
}

/// Pointer form of [`Opcode::AsmInsertXor`]; the top range has no room for bit 4.
const ASM_INSERT_XOR_POINTER: u8 = 0xF4;

#[derive(Debug, Clone, Copy)]
pub struct OpcodeDesc {
    pub op: Opcode,
    pub mnemonic: &'static str,
    pub block: bool,
    pub multiline: bool,
    pub preprocess: bool,
}

const fn desc(op: Opcode, mnemonic: &'static str) -> OpcodeDesc {
    OpcodeDesc { op, mnemonic, block: false, multiline: false, preprocess: false }
}

const fn block(op: Opcode, mnemonic: &'static str) -> OpcodeDesc {
    OpcodeDesc { op, mnemonic, block: true, multiline: false, preprocess: false }
}

const fn multiline(op: Opcode, mnemonic: &'static str) -> OpcodeDesc {
    OpcodeDesc { op, mnemonic, block: false, multiline: true, preprocess: false }
}

const fn preprocess(op: Opcode, mnemonic: &'static str) -> OpcodeDesc {
    OpcodeDesc { op, mnemonic, block: false, multiline: false, preprocess: true }
}

/// Ordered by tag. `Opcode::desc` indexes into this table.
pub const TABLE: &[OpcodeDesc] = &[
    preprocess(Opcode::WriteByte, "write8"),
    preprocess(Opcode::WriteShort, "write16"),
    preprocess(Opcode::WriteWord, "write32"),
    OpcodeDesc { op: Opcode::WriteString, mnemonic: "writestr", block: false, multiline: true, preprocess: true },
    preprocess(Opcode::WriteSerial, "writeserial"),
    block(Opcode::IfEqual32, "if.eq32"),
    block(Opcode::IfNotEqual32, "if.ne32"),
    block(Opcode::IfGreaterThan32, "if.gt32"),
    block(Opcode::IfLessThan32, "if.lt32"),
    block(Opcode::IfEqual16, "if.eq16"),
    block(Opcode::IfNotEqual16, "if.ne16"),
    block(Opcode::IfGreaterThan16, "if.gt16"),
    block(Opcode::IfLessThan16, "if.lt16"),
    desc(Opcode::BaseAddressLoad, "ba.load"),
    desc(Opcode::BaseAddressSet, "ba.set"),
    desc(Opcode::BaseAddressStore, "ba.store"),
    desc(Opcode::BaseAddressGetNext, "ba.next"),
    desc(Opcode::PointerAddressLoad, "po.load"),
    desc(Opcode::PointerAddressSet, "po.set"),
    desc(Opcode::PointerAddressStore, "po.store"),
    desc(Opcode::PointerAddressGetNext, "po.next"),
    desc(Opcode::RepeatSet, "repeat.set"),
    desc(Opcode::RepeatExecute, "repeat.exec"),
    desc(Opcode::Return, "return"),
    desc(Opcode::Goto, "goto"),
    desc(Opcode::Gosub, "gosub"),
    desc(Opcode::RegisterSet, "gr.set"),
    desc(Opcode::RegisterLoad, "gr.load"),
    desc(Opcode::RegisterStore, "gr.store"),
    desc(Opcode::RegisterOperateImmediate, "gr.opi"),
    desc(Opcode::RegisterOperate, "gr.op"),
    desc(Opcode::MemoryCopyTo, "memcpy.to"),
    desc(Opcode::MemoryCopyFrom, "memcpy.from"),
    block(Opcode::RegisterIfEqual16, "grif.eq16"),
    block(Opcode::RegisterIfNotEqual16, "grif.ne16"),
    block(Opcode::RegisterIfGreaterThan16, "grif.gt16"),
    block(Opcode::RegisterIfLessThan16, "grif.lt16"),
    block(Opcode::CounterIfEqual16, "ctrif.eq16"),
    block(Opcode::CounterIfNotEqual16, "ctrif.ne16"),
    block(Opcode::CounterIfGreaterThan16, "ctrif.gt16"),
    block(Opcode::CounterIfLessThan16, "ctrif.lt16"),
    multiline(Opcode::AsmExecute, "asm.exec"),
    multiline(Opcode::AsmInsert, "asm.insert"),
    multiline(Opcode::AsmInsertLink, "asm.insertl"),
    preprocess(Opcode::WriteBranch, "branch"),
    desc(Opcode::Switch, "switch"),
    desc(Opcode::AddressRangeCheck, "rangecheck"),
    desc(Opcode::Terminator, "terminator"),
    desc(Opcode::Endif, "endif"),
    desc(Opcode::Exit, "exit"),
    multiline(Opcode::AsmInsertXor, "asm.insertxor"),
    OpcodeDesc { op: Opcode::BrainslugSearch, mnemonic: "bsearch", block: true, multiline: true, preprocess: false },
];

impl Opcode {
    pub const ALL: [Opcode; 52] = [
        Opcode::WriteByte,
        Opcode::WriteShort,
        Opcode::WriteWord,
        Opcode::WriteString,
        Opcode::WriteSerial,
        Opcode::IfEqual32,
        Opcode::IfNotEqual32,
        Opcode::IfGreaterThan32,
        Opcode::IfLessThan32,
        Opcode::IfEqual16,
        Opcode::IfNotEqual16,
        Opcode::IfGreaterThan16,
        Opcode::IfLessThan16,
        Opcode::BaseAddressLoad,
        Opcode::BaseAddressSet,
        Opcode::BaseAddressStore,
        Opcode::BaseAddressGetNext,
        Opcode::PointerAddressLoad,
        Opcode::PointerAddressSet,
        Opcode::PointerAddressStore,
        Opcode::PointerAddressGetNext,
        Opcode::RepeatSet,
        Opcode::RepeatExecute,
        Opcode::Return,
        Opcode::Goto,
        Opcode::Gosub,
        Opcode::RegisterSet,
        Opcode::RegisterLoad,
        Opcode::RegisterStore,
        Opcode::RegisterOperateImmediate,
        Opcode::RegisterOperate,
        Opcode::MemoryCopyTo,
        Opcode::MemoryCopyFrom,
        Opcode::RegisterIfEqual16,
        Opcode::RegisterIfNotEqual16,
        Opcode::RegisterIfGreaterThan16,
        Opcode::RegisterIfLessThan16,
        Opcode::CounterIfEqual16,
        Opcode::CounterIfNotEqual16,
        Opcode::CounterIfGreaterThan16,
        Opcode::CounterIfLessThan16,
        Opcode::AsmExecute,
        Opcode::AsmInsert,
        Opcode::AsmInsertLink,
        Opcode::WriteBranch,
        Opcode::Switch,
        Opcode::AddressRangeCheck,
        Opcode::Terminator,
        Opcode::Endif,
        Opcode::Exit,
        Opcode::AsmInsertXor,
        Opcode::BrainslugSearch,
    ];

    /// Resolve the leading byte of a record to its opcode.
    ///
    /// Bit 0 belongs to the address field and bit 4 is the pointer flag, so
    /// neither takes part in the lookup. The top range (`0xF0..`) has no
    /// pointer bit; `0xF4` aliases the pointer form of `AsmInsertXor`.
    pub fn resolve(tag: u8) -> Result<Opcode, UnknownOpcode> {
        let masked = tag & 0xFE;
        if masked == ASM_INSERT_XOR_POINTER {
            return Ok(Opcode::AsmInsertXor);
        }
        let code = if masked >= 0xF0 { masked } else { masked & 0xEE };
        Opcode::from_code(code).ok_or(UnknownOpcode(tag))
    }

    fn from_code(code: u8) -> Option<Opcode> {
        TABLE
            .binary_search_by_key(&code, |d| d.op.tag())
            .ok()
            .map(|i| TABLE[i].op)
    }

    /// Canonical tag byte (no pointer bit).
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Tag byte for this opcode with the pointer flag applied, or `None` when the
    /// opcode has no pointer form.
    pub fn tag_with_pointer(self, pointer: bool) -> Option<u8> {
        match (self, pointer) {
            (_, false) => Some(self.tag()),
            (Opcode::AsmInsertXor, true) => Some(ASM_INSERT_XOR_POINTER),
            (op, true) if op.supports_pointer() => Some(op.tag() | POINTER_BIT),
            _ => None,
        }
    }

    /// Whether `tag` carries the pointer flag for the opcode it resolves to.
    pub fn pointer_flag(tag: u8) -> bool {
        let masked = tag & 0xFE;
        if masked >= 0xF0 {
            masked == ASM_INSERT_XOR_POINTER
        } else {
            tag & POINTER_BIT != 0
        }
    }

    pub fn desc(self) -> &'static OpcodeDesc {
        let i = TABLE
            .binary_search_by_key(&self.tag(), |d| d.op.tag())
            .unwrap_or_else(|_| unreachable!("opcode {self:?} missing from TABLE"));
        &TABLE[i]
    }

    pub fn mnemonic(self) -> &'static str {
        self.desc().mnemonic
    }

    /// Opcodes whose payload is the run of instructions up to the next sentinel.
    pub fn is_block(self) -> bool {
        self.desc().block
    }

    /// Opcodes carrying a length-prefixed run of raw payload lines.
    pub fn is_multiline(self) -> bool {
        self.desc().multiline
    }

    /// Opcodes that can be written straight into the target image.
    pub fn can_preprocess(self) -> bool {
        self.desc().preprocess
    }

    pub fn is_sentinel(self) -> bool {
        matches!(self, Opcode::Terminator | Opcode::Exit)
    }

    /// `E0`/`E2` would alias into the top range with bit 4 set, and the top range
    /// has no pointer bit except for the `F4` alias.
    pub fn supports_pointer(self) -> bool {
        match self {
            Opcode::AsmInsertXor => true,
            op => op.tag() < 0xE0,
        }
    }
}
