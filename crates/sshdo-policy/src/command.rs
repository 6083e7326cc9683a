//! Command-text decoding for policy directives (§4.2).

use thiserror::Error;

/// The sentinel command string for an interactive (no command requested)
/// session.
pub const INTERACTIVE: &str = "<interactive>";

const BINARY_PREFIX: &str = "<binary>";

/// An error decoding a `<binary>`-prefixed command.
#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error(transparent)]
    Escape(#[from] sshdo_log::UnescapeError),
    #[error("decoded command is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode the command portion of an authorisation directive. `<interactive>`
/// passes through as the sentinel; a `<binary>` prefix triggers `\xNN`/`\\`
/// decoding of the remainder; anything else is returned verbatim.
pub fn decode_command(raw: &str) -> Result<String, CommandDecodeError> {
    if raw == INTERACTIVE {
        return Ok(INTERACTIVE.to_string());
    }

    if let Some(rest) = raw.strip_prefix(BINARY_PREFIX) {
        let rest = rest.trim_start();
        let bytes = sshdo_log::unescape(rest)?;
        return String::from_utf8(bytes).map_err(|_| CommandDecodeError::InvalidUtf8);
    }

    Ok(raw.to_string())
}

/// Inverse of [`decode_command`], used when the learn/unlearn drivers
/// render a coalesced command back into policy-file text. Plain text
/// passes through verbatim; anything containing a control byte or a
/// backslash gets the `<binary>` treatment so it round-trips.
pub fn encode_command(cmd: &str) -> String {
    if cmd == INTERACTIVE {
        return cmd.to_string();
    }

    let needs_escape = cmd.bytes().any(|b| b < 0x20 || b == b'\\');
    if needs_escape {
        format!("{BINARY_PREFIX} {}", sshdo_log::escape(cmd.as_bytes(), |_| false))
    } else {
        cmd.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactive_sentinel_passes_through() {
        assert_eq!(decode_command("<interactive>").unwrap(), "<interactive>");
    }

    #[test]
    fn plain_command_passes_through() {
        assert_eq!(decode_command("echo hi").unwrap(), "echo hi");
    }

    #[test]
    fn binary_prefix_decodes_escapes() {
        assert_eq!(
            decode_command(r"<binary> echo\x09hi").unwrap(),
            "echo\thi"
        );
    }

    #[test]
    fn encode_plain_command_is_verbatim() {
        assert_eq!(encode_command("echo hi"), "echo hi");
    }

    #[test]
    fn encode_decode_roundtrips_control_bytes() {
        let original = "echo\thi";
        let encoded = encode_command(original);
        assert_eq!(decode_command(&encoded).unwrap(), original);
    }
}
