//! The `\xNN` escape grammar shared by the audit-record format (§4.4) and
//! the `<binary>` command encoding in the policy file format (§4.2).
//!
//! Both contexts escape bytes 0x00-0x1f and `\`; the audit format
//! additionally escapes `"`, since values are wrapped in double quotes.

use thiserror::Error;

/// Escape `value`, additionally escaping every byte for which
/// `extra_escape` returns `true` (e.g. `"` for audit-record values).
/// `\` and `"` get their short two-character forms (`\\`, `\"`); every
/// other escaped byte, including the 0x00-0x1f control range, gets the
/// `\xNN` form.
pub fn escape(value: &[u8], extra_escape: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value {
        if b == b'\\' {
            out.push_str("\\\\");
        } else if b == b'"' && extra_escape(b) {
            out.push_str("\\\"");
        } else if b < 0x20 || extra_escape(b) {
            out.push_str(&format!("\\x{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// An error unescaping a `\xNN`-encoded value.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum UnescapeError {
    /// A `\` was not followed by `x`, `\`, or `"`.
    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),
    /// A `\x` was not followed by two hex digits.
    #[error("invalid hex escape at byte {0}")]
    InvalidHex(usize),
    /// The input ended in the middle of an escape sequence.
    #[error("truncated escape sequence")]
    Truncated,
}

/// Invert [`escape`]: decode `\xNN`, `\\`, and `\"` back to raw bytes.
/// Any other byte passes through unchanged.
pub fn unescape(value: &str) -> Result<Vec<u8>, UnescapeError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let esc = *bytes.get(i + 1).ok_or(UnescapeError::Truncated)?;
        match esc {
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'"' => {
                out.push(b'"');
                i += 2;
            }
            b'x' => {
                let hex = bytes
                    .get(i + 2..i + 4)
                    .ok_or(UnescapeError::Truncated)?;
                let hex = std::str::from_utf8(hex).map_err(|_| UnescapeError::InvalidHex(i))?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| UnescapeError::InvalidHex(i))?;
                out.push(byte);
                i += 4;
            }
            _ => return Err(UnescapeError::InvalidEscape(i)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn roundtrip_is_identity_on_arbitrary_bytes() {
        let original: Vec<u8> = (0..=255).collect();
        let escaped = escape(&original, |b| b == b'"');
        let decoded = unescape(&escaped).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn audit_values_escape_quotes() {
        let escaped = escape(br#"say "hi""#, |b| b == b'"');
        assert_eq!(escaped, r#"say \"hi\""#);
    }

    #[test]
    fn binary_command_does_not_escape_quotes() {
        let escaped = escape(br#"say "hi""#, |_| false);
        assert_eq!(escaped, r#"say "hi""#);
    }

    #[test]
    fn control_bytes_and_backslash_are_escaped() {
        let escaped = escape(b"a\tb\\c", |_| false);
        assert_eq!(escaped, r"a\x09b\\c");
    }
}
