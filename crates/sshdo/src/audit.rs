//! Audit emitter (§4.4): renders a structured record and hands it to the
//! event-log service. Syslog transport itself is explicitly out of scope
//! for the core engine (§1 Non-goals); this module is the thin external
//! collaborator that wires the `syslog` crate up to it.

use std::io;

use sshdo_log::{Priority, RecordBuilder, RecordType};
use sshdo_policy::{Facility, Label, Settings};
use syslog::{Formatter3164, Logger, LoggerBackend};
use thiserror::Error;

use crate::decision::Outcome;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot connect to syslog: {0}")]
    Connect(#[source] syslog::Error),
    #[error("failed to write audit record: {0}")]
    Write(#[source] io::Error),
}

/// Connects to the host's event-log service and renders/sends records.
pub struct AuditEmitter {
    logger: Logger<LoggerBackend, Formatter3164>,
}

impl AuditEmitter {
    pub fn connect(settings: &Settings, progname: &str) -> Result<Self, AuditError> {
        let formatter = Formatter3164 {
            facility: to_syslog_facility(settings.syslog_facility),
            hostname: None,
            process: progname.to_string(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter).map_err(AuditError::Connect)?;
        Ok(Self { logger })
    }

    /// Render `record` and send it at the priority implied by its type
    /// (`info` for `allowed`, `err` for everything else — §4.4).
    pub fn emit(&mut self, record: &RecordBuilder) -> Result<(), AuditError> {
        let line = record.render();
        let result = match record.priority() {
            Priority::Info => self.logger.info(line),
            Priority::Err => self.logger.err(line),
        };
        result.map_err(|e| AuditError::Write(to_io_error(e)))
    }
}

fn to_syslog_facility(facility: Facility) -> syslog::Facility {
    match facility {
        Facility::Auth => syslog::Facility::LOG_AUTH,
        Facility::Daemon => syslog::Facility::LOG_DAEMON,
        Facility::User => syslog::Facility::LOG_USER,
        Facility::Local0 => syslog::Facility::LOG_LOCAL0,
        Facility::Local1 => syslog::Facility::LOG_LOCAL1,
        Facility::Local2 => syslog::Facility::LOG_LOCAL2,
        Facility::Local3 => syslog::Facility::LOG_LOCAL3,
        Facility::Local4 => syslog::Facility::LOG_LOCAL4,
        Facility::Local5 => syslog::Facility::LOG_LOCAL5,
        Facility::Local6 => syslog::Facility::LOG_LOCAL6,
        Facility::Local7 => syslog::Facility::LOG_LOCAL7,
    }
}

fn to_io_error(err: syslog::Error) -> io::Error {
    match err.0 {
        syslog::ErrorKind::Io(err) => err,
        syslog::ErrorKind::Msg(msg) => io::Error::other(msg),
        other => io::Error::other(other.to_string()),
    }
}

/// Build the record for a forced-command decision, fields in the order
/// §4.4 specifies: `type`, `user`, `remoteip`, `label`, `command`,
/// `group`, `config`. Empty fields are omitted by `RecordBuilder::push`.
pub fn decision_record(
    outcome: &Outcome,
    user: &str,
    remoteip: Option<&str>,
    label: &Label,
    cmd: &str,
    config: Option<&str>,
) -> RecordBuilder {
    let record_type = match outcome {
        Outcome::Allowed | Outcome::AllowedByGroup(_) => RecordType::Allowed,
        Outcome::Training | Outcome::TrainingByGroup(_) => RecordType::Training,
        Outcome::Disallowed => RecordType::Disallowed,
    };

    let mut b = RecordBuilder::new(record_type);
    b.push("user", user);
    b.push("remoteip", remoteip.unwrap_or(""));
    b.push("label", label.as_field());
    b.push("command", cmd);
    b.push("group", outcome.group().unwrap_or(""));
    b.push("config", config.unwrap_or(""));
    b
}

/// A config-load diagnostic surfaced at runtime (§4.4, §7 tier 2): either
/// a malformed line (`filename`/`linenumber`/`line`) or an unreadable
/// file (`filename`/`error`).
pub fn config_error_record(
    filename: &str,
    linenumber: Option<usize>,
    line: Option<&str>,
    error: Option<&str>,
) -> RecordBuilder {
    let mut b = RecordBuilder::new(RecordType::ConfigError);
    b.push("filename", filename);
    if let Some(n) = linenumber {
        b.push("linenumber", n.to_string());
    }
    b.push("line", line.unwrap_or(""));
    b.push("error", error.unwrap_or(""));
    b
}

/// An exec failure on the allow/train path (§4.4, §7 tier 2).
pub fn exec_error_record(command: &str, error: &str) -> RecordBuilder {
    let mut b = RecordBuilder::new(RecordType::ExecError);
    b.push("command", command);
    b.push("error", error);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_record_omits_empty_fields() {
        let outcome = Outcome::Allowed;
        let record = decision_record(&outcome, "alice", None, &Label::Any, "echo 42", None);
        assert_eq!(
            record.render(),
            r#"type="allowed" user="alice" command="echo 42""#
        );
    }

    #[test]
    fn decision_record_includes_group_and_label() {
        let outcome = Outcome::AllowedByGroup("admins".to_string());
        let label = Label::normalize("prod");
        let record = decision_record(&outcome, "mallory", Some("10.0.0.1"), &label, "uptime", None);
        assert_eq!(
            record.render(),
            r#"type="allowed" user="mallory" remoteip="10.0.0.1" label="prod" command="uptime" group="admins""#
        );
    }

    #[test]
    fn config_record_has_filename_and_linenumber() {
        let record = config_error_record("/etc/sshdoers", Some(4), Some("bogus line"), None);
        assert_eq!(
            record.render(),
            r#"type="configerror" filename="/etc/sshdoers" linenumber="4" line="bogus line""#
        );
    }
}
