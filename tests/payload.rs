use gecko_codec::{
    decode, encode, AddressMode, AddressRegister, ArithmeticOp, CodecError, Comparison, Condition, CopyDirection,
    Fields, Instruction, Register, SerialWrite, ValueSize,
};
use pretty_assertions::assert_eq;

fn words(ws: &[u32]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn reg(i: u8) -> Register {
    Register::new(i).unwrap()
}

/// Decode a single leaf record and check it re-encodes byte for byte.
fn leaf(ws: &[u32]) -> Instruction {
    let bytes = words(ws);
    let mut codes = decode(&bytes).unwrap();
    assert_eq!(codes.len(), 1);
    let code = codes.remove(0);
    assert_eq!(encode(&code).unwrap(), bytes);
    assert_eq!(code.encoded_len() % 8, 0);
    code
}

/// Decode a conditional followed by a terminator; returns the opener.
fn opener(ws: &[u32]) -> Instruction {
    let mut all = ws.to_vec();
    all.extend_from_slice(&[0xE000_0000, 0]);
    let codes = decode(&words(&all)).unwrap();
    assert_eq!(codes.len(), 2);
    assert_eq!(encode(&codes[0]).unwrap(), words(ws));
    codes[0].clone()
}

#[test]
fn serial_write() {
    let code = leaf(&[0x0800_8000, 10, 0x2002_0004, 1]);
    let Fields::WriteSerial(serial) = &code.fields else { panic!("{code:?}") };
    assert_eq!(
        *serial,
        SerialWrite { address: 0x8000, value: 10, size: ValueSize::Word, repeat: 2, address_step: 4, value_step: 1 }
    );
    assert_eq!(serial.writes(), vec![(0x8000, 10), (0x8004, 11), (0x8008, 12)]);
    assert_eq!(code.virtual_length(), 2);
}

#[test]
fn write_string_is_padded() {
    let code = Instruction::new(Fields::WriteString { address: 0x1000, data: b"abc".to_vec() }).unwrap();
    let bytes = encode(&code).unwrap();
    assert_eq!(bytes, words(&[0x0600_1000, 3, 0x6162_6300, 0]));
    assert_eq!(decode(&bytes).unwrap(), vec![code]);

    let empty = Instruction::new(Fields::WriteString { address: 0, data: Vec::new() }).unwrap();
    assert_eq!(encode(&empty).unwrap(), words(&[0x0600_0000, 0]));
}

#[test]
fn writes_and_pointer_flag() {
    let code = leaf(&[0x1400_1234, 0x3F80_0000]);
    assert!(code.pointer);
    assert_eq!(code.address_register(), AddressRegister::Pointer);
    assert_eq!(code.fields, Fields::WriteWord { address: 0x1234, value: 0x3F80_0000 });

    // address bit 24 lives in the tag byte
    let code = leaf(&[0x0500_0000, 1]);
    assert!(!code.pointer);
    assert_eq!(code.fields, Fields::WriteWord { address: 0x0100_0000, value: 1 });

    let code = leaf(&[0x0000_2000, 0x0003_00FF]);
    assert_eq!(code.fields, Fields::WriteByte { address: 0x2000, value: 0xFF, repeat: 3 });
    let code = leaf(&[0x1200_2000, 0x0001_BEEF]);
    assert_eq!(code.fields, Fields::WriteShort { address: 0x2000, value: 0xBEEF, repeat: 1 });
}

#[test]
fn conditionals() {
    let code = opener(&[0x2700_1001, 0x0000_0010]);
    assert_eq!(code.fields, Fields::If32 { cmp: Comparison::LessThan, address: 0x0100_1000, value: 0x10, endif: true });

    let code = opener(&[0x3A00_2000, 0xFF00_0042]);
    assert!(code.pointer);
    assert_eq!(
        code.fields,
        Fields::If16 { cmp: Comparison::NotEqual, address: 0x2000, value: 0x42, mask: 0xFF00, endif: false }
    );

    let code = opener(&[0xA400_1000, 0xF300_00FF]);
    assert_eq!(
        code.fields,
        Fields::RegisterIf16 {
            cmp: Comparison::GreaterThan,
            address: 0x1000,
            register: reg(3),
            other: Register::ADDRESS,
            mask: 0xFF,
            endif: false,
        }
    );

    let code = opener(&[0xA800_0079, 0x0000_0003]);
    assert_eq!(
        code.fields,
        Fields::CounterIf16 { cmp: Comparison::Equal, value: 3, mask: 0, counter: 7, reset_on_true: true, endif: true }
    );
}

#[test]
fn address_registers() {
    let code = leaf(&[0x4011_1005, 0x8000_1000]);
    assert_eq!(
        code.fields,
        Fields::AddressLoad {
            target: AddressRegister::Base,
            mode: AddressMode::ACCUMULATE | AddressMode::WITH_ADDRESS | AddressMode::WITH_REGISTER,
            register: reg(5),
            value: 0x8000_1000,
        }
    );
    let code = leaf(&[0x4A00_0000, 0x8000_0000]);
    assert_eq!(
        code.fields,
        Fields::AddressSet { target: AddressRegister::Pointer, mode: AddressMode::empty(), register: reg(0), value: 0x8000_0000 }
    );
    let code = leaf(&[0x4600_0010, 0]);
    assert_eq!(code.fields, Fields::AddressGetNext { target: AddressRegister::Base, offset: 0x10 });

    let store = Fields::AddressStore {
        target: AddressRegister::Base,
        mode: AddressMode::ACCUMULATE,
        register: reg(0),
        value: 0,
    };
    assert_eq!(Instruction::new(store).unwrap_err(), CodecError::InvalidField { field: "mode", value: 1 << 20 });
}

#[test]
fn flow_control() {
    let code = leaf(&[0x6000_0005, 0x0000_0002]);
    assert_eq!(code.fields, Fields::RepeatSet { count: 5, block: reg(2) });
    let code = leaf(&[0x6400_0000, 0x0000_0003]);
    assert_eq!(code.fields, Fields::Return { condition: Condition::IfTrue, block: reg(3) });
    let code = leaf(&[0x6620_0004, 0]);
    assert_eq!(code.fields, Fields::Goto { condition: Condition::Always, offset: 4 });
    let code = leaf(&[0x6810_0002, 0x0000_0001]);
    assert_eq!(code.fields, Fields::Gosub { condition: Condition::IfFalse, offset: 2, block: reg(1) });

    assert_eq!(
        decode(&words(&[0x6630_0000, 0])),
        Err(CodecError::InvalidField { field: "condition", value: 3 })
    );
}

#[test]
fn gecko_registers() {
    let code = leaf(&[0x8011_0004, 0x0000_0010]);
    assert_eq!(
        code.fields,
        Fields::RegisterSet { register: reg(4), mode: AddressMode::ACCUMULATE | AddressMode::WITH_ADDRESS, value: 0x10 }
    );
    let code = leaf(&[0x8221_0002, 0x8000_3000]);
    assert_eq!(
        code.fields,
        Fields::RegisterLoad { register: reg(2), size: ValueSize::Word, with_address: true, address: 0x8000_3000 }
    );
    let code = leaf(&[0x8410_0031, 0x8000_3000]);
    assert_eq!(
        code.fields,
        Fields::RegisterStore { register: reg(1), size: ValueSize::Short, with_address: false, repeat: 3, address: 0x8000_3000 }
    );
    let code = leaf(&[0x8641_0005, 0x0000_0003]);
    assert_eq!(
        code.fields,
        Fields::RegisterOperateImmediate {
            register: reg(5),
            op: ArithmeticOp::Xor,
            deref_register: true,
            deref_value: false,
            value: 3,
        }
    );
    let code = leaf(&[0x8892_0001, 0x0000_0002]);
    assert_eq!(
        code.fields,
        Fields::RegisterOperate {
            register: reg(1),
            other: reg(2),
            op: ArithmeticOp::FloatAdd,
            deref_register: false,
            deref_value: true,
        }
    );
    let code = leaf(&[0x8C00_202F, 0x0000_0100]);
    assert_eq!(
        code.fields,
        Fields::MemoryCopy {
            direction: CopyDirection::FromAddress,
            size: 0x20,
            register: reg(2),
            other: Register::ADDRESS,
            offset: 0x100,
        }
    );

    assert_eq!(decode(&words(&[0x86F0_0000, 0])), Err(CodecError::InvalidField { field: "op", value: 0xF }));
    assert_eq!(decode(&words(&[0x8230_0000, 0])), Err(CodecError::InvalidField { field: "size", value: 3 }));
}

#[test]
fn assembly_codes() {
    let code = leaf(&[0xC000_0000, 1, 0x3860_0001, 0x4E80_0020]);
    assert_eq!(code.fields, Fields::AsmExecute { code: words(&[0x3860_0001, 0x4E80_0020]) });

    let code = leaf(&[0xC400_1000, 1, 0x6000_0000, 0x0000_0000]);
    assert_eq!(code.fields, Fields::AsmInsert { address: 0x1000, link: true, code: words(&[0x6000_0000, 0]) });

    let code = leaf(&[0xF400_1000, 0x02BE_EF01, 0x6000_0000, 0x0000_0000]);
    assert!(code.pointer);
    assert_eq!(
        code.fields,
        Fields::AsmInsertXor { address: 0x1000, xor_count: 2, checksum: 0xBEEF, code: words(&[0x6000_0000, 0]) }
    );

    // code bodies are whole lines; a partial line would not decode back the same
    let partial = Fields::AsmExecute { code: words(&[0x4E80_0020]) };
    assert_eq!(Instruction::new(partial).unwrap_err(), CodecError::InvalidField { field: "code", value: 4 });
    let partial = Fields::BrainslugSearch { range_start: 0, range_end: 0, pattern: vec![0x3C; 12] };
    assert_eq!(Instruction::new(partial).unwrap_err(), CodecError::InvalidField { field: "pattern", value: 12 });

    let code = vec![0x4E, 0x80, 0x00, 0x20];
    let node = Instruction { pointer: false, fields: Fields::AsmExecute { code }, children: vec![] };
    assert!(matches!(encode(&node), Err(CodecError::InvalidField { field: "code", .. })));
}

#[test]
fn handler_control() {
    let code = leaf(&[0xC600_2000, 0x8000_3000]);
    assert_eq!(code.fields, Fields::WriteBranch { address: 0x2000, destination: 0x8000_3000 });
    let code = leaf(&[0xCC00_0000, 0]);
    assert_eq!(code.fields, Fields::Switch);
    let code = leaf(&[0xCE00_0001, 0x8000_8100]);
    assert_eq!(code.fields, Fields::AddressRangeCheck { start: 0x8000, end: 0x8100, endif: true });
    let code = leaf(&[0xE210_0002, 0x8000_8100]);
    assert_eq!(
        code.fields,
        Fields::Endif { as_else: true, count: 2, base_high: 0x8000, pointer_high: 0x8100 }
    );
    let code = leaf(&[0xE000_0000, 0x8000_0000]);
    assert_eq!(code.fields, Fields::Terminator { base_high: 0x8000, pointer_high: 0 });
}

#[test]
fn truncation_and_unknown_tags() {
    let bytes = words(&[0x0600_1000, 0x10, 0x6162_6364]);
    assert_eq!(decode(&bytes), Err(CodecError::UnexpectedEndOfStream { offset: 0, tag: Some(0x06) }));

    let mut bytes = words(&[0x0400_0000, 1]);
    bytes.extend_from_slice(&[0x08, 0x00, 0x10]);
    assert_eq!(decode(&bytes), Err(CodecError::UnexpectedEndOfStream { offset: 8, tag: Some(0x08) }));

    let bytes = words(&[0x0400_0000, 1, 0x0A00_0000, 0]);
    let err = decode(&bytes).unwrap_err();
    assert_eq!(err, CodecError::UnknownOpcode { tag: 0x0A, offset: 8 });
    assert_eq!(err.offset(), Some(8));
}

#[test]
fn field_widths_are_checked() {
    let wide = Fields::WriteWord { address: 0x0200_0000, value: 0 };
    assert!(matches!(Instruction::new(wide), Err(CodecError::InvalidField { field: "address", .. })));

    let odd = Fields::If32 { cmp: Comparison::Equal, address: 0x1001, value: 0, endif: false };
    assert!(Instruction::new(odd).is_err());

    let serial = SerialWrite { address: 0, value: 0, size: ValueSize::Byte, repeat: 0x1000, address_step: 1, value_step: 0 };
    assert_eq!(
        Instruction::new(Fields::WriteSerial(serial)).unwrap_err(),
        CodecError::InvalidField { field: "repeat", value: 0x1000 }
    );

    let xor = Fields::AsmInsertXor { address: 0, xor_count: 0, checksum: 0, code: vec![0; 256 * 8] };
    assert!(Instruction::new(xor).is_err());
}

#[test]
fn undefined_mode_bits_are_rejected() {
    // 0x0E00_0000 would land in the tag byte and turn the record into a get-next
    let stray = AddressMode::from_bits_retain(0x0E00_0000);
    let load = Fields::AddressLoad { target: AddressRegister::Base, mode: stray, register: reg(0), value: 0 };
    assert_eq!(
        Instruction::new(load.clone()).unwrap_err(),
        CodecError::InvalidField { field: "mode", value: 0x0E00_0000 }
    );
    let node = Instruction { pointer: false, fields: load, children: vec![] };
    assert!(matches!(encode(&node), Err(CodecError::InvalidField { field: "mode", .. })));

    let nibble = AddressMode::WITH_ADDRESS | AddressMode::from_bits_retain(0x3);
    let set = Fields::AddressSet { target: AddressRegister::Pointer, mode: nibble, register: reg(1), value: 0 };
    assert!(Instruction::new(set).is_err());
    let reg_set = Fields::RegisterSet { register: reg(2), mode: AddressMode::from_bits_retain(1 << 24), value: 0 };
    assert!(Instruction::new(reg_set).is_err());
    let store = Fields::AddressStore {
        target: AddressRegister::Base,
        mode: AddressMode::from_bits_retain(1 << 8),
        register: reg(0),
        value: 0,
    };
    assert!(Instruction::new(store).is_err());

    let defined = AddressMode::ACCUMULATE | AddressMode::WITH_ADDRESS | AddressMode::WITH_REGISTER;
    let load = Fields::AddressLoad { target: AddressRegister::Base, mode: defined, register: reg(3), value: 0x10 };
    assert!(Instruction::new(load).is_ok());
}
