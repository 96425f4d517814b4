use gecko_codec::{decode, describe_tree, parse_text, render, Fields, Instruction, RenderError};
use pretty_assertions::assert_eq;

fn words(ws: &[u32]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_be_bytes()).collect()
}

const LISTING: &str = "20001000 00000001\n00002000 0000007F\nE0000000 00000000";

#[test]
fn render_and_parse_agree() {
    let bytes = words(&[0x2000_1000, 0x0000_0001, 0x0000_2000, 0x0000_007F, 0xE000_0000, 0x0000_0000]);
    assert_eq!(render(&bytes).unwrap(), LISTING);
    assert_eq!(parse_text(LISTING).unwrap(), bytes);

    let codes = decode(&bytes).unwrap();
    assert_eq!(codes[0].as_text().unwrap(), "20001000 00000001\n00002000 0000007F");
}

#[test]
fn odd_lengths_are_rejected() {
    assert_eq!(render(&[0x04, 0x00]), Err(RenderError::Unaligned(2)));
    assert_eq!(render(&[0xC0, 0, 0, 0]).unwrap(), "C0000000");
}

#[test]
fn tree_descriptions() {
    let codes = decode(&parse_text(LISTING).unwrap()).unwrap();
    assert_eq!(
        describe_tree(&codes),
        "(20) If the word at address (0x00001000 + the base address) is equal to 0x00000001:\n\
         \x20\x20(00) Write byte 0x7F to (0x00002000 + the base address)\n\
         (E0) Clear the code execution status.\n"
    );
}

#[test]
fn one_line_descriptions() {
    let word = decode(&words(&[0x1400_1234, 0x3F80_0000])).unwrap().remove(0);
    assert_eq!(word.to_string(), "(14) Write word 0x3F800000 to 0x00001234 + the pointer address");

    let xor = Instruction::new(Fields::AsmInsertXor { address: 0x1000, xor_count: 1, checksum: 0x1234, code: vec![] })
        .unwrap()
        .with_pointer(true)
        .unwrap();
    assert!(xor.to_string().starts_with("(F4) Inject (b / b) the designated ASM at (0x00001000 + the pointer address)"));

    let endif = decode(&words(&[0xE210_0002, 0x8000_0000])).unwrap().remove(0);
    assert_eq!(
        endif.to_string(),
        "(E2) (Apply 2 Endifs) Inverse the code execution status (else) Set the base address to 80000000."
    );

    let goto = decode(&words(&[0x6620_0004, 0])).unwrap().remove(0);
    assert_eq!(goto.to_string(), "(66) Jump to (next line of code + 4 lines)");

    let op = decode(&words(&[0x8600_0003, 0x0000_0001])).unwrap().remove(0);
    assert_eq!(op.to_string(), "(86) Add 00000001 to Gecko Register 3");

    let set = decode(&words(&[0x4200_1002, 0x0000_0010])).unwrap().remove(0);
    assert_eq!(set.to_string(), "(42) Set the base address to the value (gr2 + 0x00000010)");
}
