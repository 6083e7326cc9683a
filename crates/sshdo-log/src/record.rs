//! The structured audit-record format (§4.4) and its own parser (§4.5).
//!
//! A record is a sequence of `name="value"` fields, values escaped per
//! [`crate::escape`]. The same grammar is used both to emit records (the
//! forced-command path) and to read them back (the learn/unlearn drivers),
//! which is why both live in one crate.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::escape::{escape, unescape};

/// The `type="..."` discriminant of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RecordType {
    Allowed,
    Training,
    Disallowed,
    ConfigError,
    ExecError,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Allowed => "allowed",
            RecordType::Training => "training",
            RecordType::Disallowed => "disallowed",
            RecordType::ConfigError => "configerror",
            RecordType::ExecError => "execerror",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allowed" => Some(Self::Allowed),
            "training" => Some(Self::Training),
            "disallowed" => Some(Self::Disallowed),
            "configerror" => Some(Self::ConfigError),
            "execerror" => Some(Self::ExecError),
            _ => None,
        }
    }

    /// `info` for an allowed decision, `err` for everything else (§4.4).
    pub fn priority(self) -> Priority {
        match self {
            RecordType::Allowed => Priority::Info,
            _ => Priority::Err,
        }
    }
}

/// Syslog priority for a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
    Info,
    Err,
}

/// A record being built for emission: an ordered, sparse set of fields.
/// Empty values are omitted entirely, per §4.4.
#[derive(Clone, Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<(&'static str, String)>,
}

impl RecordBuilder {
    pub fn new(record_type: RecordType) -> Self {
        let mut b = Self::default();
        b.push("type", record_type.as_str());
        b
    }

    /// Push a field, skipping it entirely if `value` is empty.
    pub fn push(&mut self, name: &'static str, value: impl AsRef<str>) -> &mut Self {
        let value = value.as_ref();
        if !value.is_empty() {
            self.fields.push((name, value.to_string()));
        }
        self
    }

    pub fn priority(&self) -> Priority {
        self.fields
            .first()
            .and_then(|(_, v)| RecordType::parse(v))
            .map(RecordType::priority)
            .unwrap_or(Priority::Err)
    }

    /// Render as `name="value" name="value" ...`, escaping each value.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| {
                format!(
                    "{name}=\"{}\"",
                    escape(value.as_bytes(), |b| b == b'"')
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A successfully parsed log record, field access by name. Unset optional
/// fields return `None`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Record {
    pub record_type: Option<String>,
    fields: HashMap<String, String>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn user(&self) -> Option<&str> {
        self.field("user")
    }

    pub fn remoteip(&self) -> Option<&str> {
        self.field("remoteip")
    }

    pub fn label(&self) -> Option<&str> {
        self.field("label")
    }

    pub fn command(&self) -> Option<&str> {
        self.field("command")
    }

    pub fn group(&self) -> Option<&str> {
        self.field("group")
    }

    pub fn config(&self) -> Option<&str> {
        self.field("config")
    }
}

/// An error parsing a log line. The parser is deliberately permissive:
/// most mismatches are simply "not a candidate line" (`None` from
/// [`parse_line`]), not this error. This only fires when a line that
/// *looks* like one of ours has an escape sequence that doesn't decode.
#[derive(Debug, Error)]
#[error("malformed field value: {0}")]
pub struct RecordParseError(#[from] crate::escape::UnescapeError);

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="((?:[^"\\]|\\.)*)""#).unwrap());

/// Whether `line` might be one of this program's own log records: it
/// contains ` <progname>[` or ` <progname>:` as a substring (§4.5),
/// distinguishing it from unrelated syslog lines before the more
/// expensive field grammar is applied.
pub fn is_candidate_line(line: &str, progname: &str) -> bool {
    line.contains(&format!(" {progname}[")) || line.contains(&format!(" {progname}:"))
}

/// Parse one log line into a [`Record`], if it's a candidate for this
/// program's format. Returns `Ok(None)` for lines that aren't candidates
/// or that fail to match the field grammar (a silent miss, per §4.5);
/// returns `Err` only if a matched field's escape sequence is malformed.
pub fn parse_line(line: &str, progname: &str) -> Result<Option<Record>, RecordParseError> {
    if !is_candidate_line(line, progname) {
        return Ok(None);
    }

    let mut fields = HashMap::new();
    for caps in FIELD_RE.captures_iter(line) {
        let name = caps[1].to_string();
        let raw = &caps[2];
        let bytes = unescape(raw)?;
        let value = String::from_utf8_lossy(&bytes).into_owned();
        fields.insert(name, value);
    }

    if !fields.contains_key("type") {
        return Ok(None);
    }

    let record_type = fields.get("type").cloned();
    Ok(Some(Record {
        record_type,
        fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_omits_empty_fields() {
        let mut b = RecordBuilder::new(RecordType::Allowed);
        b.push("user", "alice");
        b.push("remoteip", "");
        b.push("command", "echo 42");
        assert_eq!(b.render(), r#"type="allowed" user="alice" command="echo 42""#);
    }

    #[test]
    fn allowed_is_info_priority() {
        let b = RecordBuilder::new(RecordType::Allowed);
        assert_eq!(b.priority(), Priority::Info);
    }

    #[test]
    fn disallowed_is_err_priority() {
        let b = RecordBuilder::new(RecordType::Disallowed);
        assert_eq!(b.priority(), Priority::Err);
    }

    #[test]
    fn roundtrips_through_render_and_parse() {
        let mut b = RecordBuilder::new(RecordType::Disallowed);
        b.push("user", "alice");
        b.push("command", "rm -rf /");
        let line = format!("Jan 1 00:00:00 host sshdo[123]: {}", b.render());

        let record = parse_line(&line, "sshdo").unwrap().unwrap();
        assert_eq!(record.record_type.as_deref(), Some("disallowed"));
        assert_eq!(record.user(), Some("alice"));
        assert_eq!(record.command(), Some("rm -rf /"));
    }

    #[test]
    fn non_candidate_lines_are_skipped() {
        assert!(parse_line("Jan 1 host sudo[1]: session opened", "sshdo")
            .unwrap()
            .is_none());
    }

    #[test]
    fn quoted_values_are_escaped_and_unescaped() {
        let mut b = RecordBuilder::new(RecordType::Training);
        b.push("user", "bob");
        b.push("command", r#"echo "hi""#);
        let line = format!("sshdo[1]: {}", b.render());

        let record = parse_line(&line, "sshdo").unwrap().unwrap();
        assert_eq!(record.command(), Some(r#"echo "hi""#));
    }
}
