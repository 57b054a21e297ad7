//! Inspect command - decode a wire payload with a shape

use anyhow::{Context, Result};
use isthmus_runtime::ffi::WireShape;
use std::fs;
use std::path::PathBuf;

/// Where the payload comes from
#[derive(Debug)]
pub enum Input {
    /// Hex digits; whitespace and a leading `0x` are ignored
    Hex(String),
    /// File of raw bytes
    File(PathBuf),
}

/// Decode the payload and render its value tree.
pub fn run(shape_text: &str, input: Input) -> Result<String> {
    let shape: WireShape = shape_text
        .parse()
        .with_context(|| format!("Invalid shape '{}'", shape_text))?;

    let bytes = match input {
        Input::Hex(text) => {
            let digits: String = text.split_whitespace().collect();
            let digits = digits.strip_prefix("0x").unwrap_or(&digits);
            hex::decode(digits).context("Invalid hex payload")?
        }
        Input::File(path) => {
            fs::read(&path).with_context(|| format!("Failed to read payload file: {}", path.display()))?
        }
    };

    tracing::debug!(shape = %shape, len = bytes.len(), "decoding payload");
    let value = shape
        .decode(&bytes)
        .with_context(|| format!("Failed to decode {}-byte payload as {}", bytes.len(), shape))?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_inspect_hex_sequence() {
        let output = run("seq<u32>", Input::Hex("00000002 00000001 00000002".into())).unwrap();
        insta::assert_snapshot!(output, @"[1, 2]");
    }

    #[test]
    fn test_inspect_hex_prefix() {
        let output = run("option<string>", Input::Hex("0x01000000026869".into())).unwrap();
        insta::assert_snapshot!(output, @r#"some("hi")"#);
    }

    #[test]
    fn test_inspect_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), [0, 0, 0, 1, b'a', 0, 0, 0, 0, 0, 0, 0, 7]).unwrap();

        let output = run("record<string,u64>", Input::File(file.path().to_path_buf())).unwrap();
        insta::assert_snapshot!(output, @r#"("a", 7)"#);
    }

    #[test]
    fn test_inspect_trailing_bytes() {
        let err = run("u8", Input::Hex("0102".into())).unwrap_err();
        assert!(format!("{:#}", err).contains("1 unread bytes"));
    }

    #[test]
    fn test_inspect_bad_shape() {
        let err = run("seq<u8", Input::Hex("".into())).unwrap_err();
        assert!(err.to_string().contains("Invalid shape"));
    }

    #[test]
    fn test_inspect_bad_hex() {
        assert!(run("u8", Input::Hex("zz".into())).is_err());
    }

    #[test]
    fn test_inspect_missing_file() {
        assert!(run("u8", Input::File(PathBuf::from("does-not-exist.bin"))).is_err());
    }
}
