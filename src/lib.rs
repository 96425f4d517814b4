pub mod decoder;
pub mod disasm;
pub mod encoder;
pub mod error;
pub mod instructions;
pub mod opcode;
pub mod patch;
pub mod payload;

pub use decoder::{decode, decode_with, DecodeOptions, Reader};
pub use disasm::{describe_tree, parse_text, render};
pub use encoder::{encode, encode_all};
pub use error::{CodecError, RenderError, UnknownOpcode};
pub use instructions::{
    AddressMode, AddressRegister, ArithmeticOp, Comparison, Condition, CopyDirection, Fields, Instruction, Register,
    SerialWrite, ValueSize,
};
pub use opcode::Opcode;
pub use patch::{PatchImage, PatchTarget};
