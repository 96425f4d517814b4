use anyhow::{Context, Result};
use std::path::Path;

use gecko_codec::parse_text;

/// Magic line at the start of a `.gct` file.
pub const GCT_HEADER: [u8; 8] = [0x00, 0xD0, 0xC0, 0xDE, 0x00, 0xD0, 0xC0, 0xDE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    /// Text if the file parses as hex groups, raw otherwise
    Auto,
    Raw,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeList {
    pub bytes: Vec<u8>,
    pub had_header: bool,
}

pub fn load_code_list(path: &Path, format: InputFormat, skip: usize, len: Option<usize>) -> Result<CodeList> {
    let file = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    code_list_from_bytes(&file, format, skip, len)
}

pub fn code_list_from_bytes(file: &[u8], format: InputFormat, skip: usize, len: Option<usize>) -> Result<CodeList> {
    let bytes = match format {
        InputFormat::Raw => file.to_vec(),
        InputFormat::Text => parse_text(std::str::from_utf8(file).context("text input is not UTF-8")?)?,
        InputFormat::Auto => match std::str::from_utf8(file).ok().map(parse_text) {
            Some(Ok(parsed)) if !parsed.is_empty() => parsed,
            _ => file.to_vec(),
        },
    };
    let (had_header, body) = match bytes.strip_prefix(&GCT_HEADER[..]) {
        Some(rest) => (true, rest),
        None => (false, &bytes[..]),
    };
    anyhow::ensure!(skip <= body.len(), "--skip exceeds code list size");
    let mut body = &body[skip..];
    if let Some(lim) = len {
        anyhow::ensure!(lim <= body.len(), "--len exceeds remaining code list size after skip");
        body = &body[..lim];
    }
    Ok(CodeList { bytes: body.to_vec(), had_header })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_is_stripped_from_raw_input() {
        let mut file = GCT_HEADER.to_vec();
        file.extend_from_slice(&[0xF0, 0, 0, 0, 0, 0, 0, 0]);
        let list = code_list_from_bytes(&file, InputFormat::Auto, 0, None).unwrap();
        assert!(list.had_header);
        assert_eq!(list.bytes, vec![0xF0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn auto_detects_hex_text() {
        let text = b"* Moon jump\n04001234 3F800000\n";
        let list = code_list_from_bytes(text, InputFormat::Auto, 0, None).unwrap();
        assert!(!list.had_header);
        assert_eq!(list.bytes, vec![0x04, 0x00, 0x12, 0x34, 0x3F, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn skip_and_len_bound_the_body() {
        let file = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let list = code_list_from_bytes(&file, InputFormat::Raw, 2, Some(4)).unwrap();
        assert_eq!(list.bytes, vec![2, 3, 4, 5]);
        assert!(code_list_from_bytes(&file, InputFormat::Raw, 9, None).is_err());
        assert!(code_list_from_bytes(&file, InputFormat::Raw, 4, Some(5)).is_err());
    }
}
