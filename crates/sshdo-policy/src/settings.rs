//! Flat settings parsed from the main policy file.

use camino::Utf8PathBuf;

use crate::pattern::MatchStyle;

/// The syslog facility an audit record is tagged with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Facility {
    /// `auth`, the default.
    #[default]
    Auth,
    Daemon,
    User,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl Facility {
    /// Parse a `syslog` directive's argument (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Some(Self::Auth),
            "daemon" => Some(Self::Daemon),
            "user" => Some(Self::User),
            "local0" => Some(Self::Local0),
            "local1" => Some(Self::Local1),
            "local2" => Some(Self::Local2),
            "local3" => Some(Self::Local3),
            "local4" => Some(Self::Local4),
            "local5" => Some(Self::Local5),
            "local6" => Some(Self::Local6),
            "local7" => Some(Self::Local7),
            _ => None,
        }
    }
}

/// Flat settings record. Only `syslog`, `match`, `banner`, and `logfiles`
/// may be set from the main file; drop-ins may not carry them (§3
/// invariant 4).
#[derive(Clone, Debug)]
pub struct Settings {
    pub syslog_facility: Facility,
    pub match_style: MatchStyle,
    pub banner_path: Option<Utf8PathBuf>,
    pub logfile_globs: Vec<String>,
    /// The path actually used to resolve policy, stored for inclusion in
    /// audit records.
    pub config_path: Utf8PathBuf,
}

impl Settings {
    /// Default log-file glob, platform-specific per spec §3.
    #[cfg(target_os = "linux")]
    pub const DEFAULT_LOGFILE_GLOB: &'static str = "/var/log/auth.log*";
    #[cfg(not(target_os = "linux"))]
    pub const DEFAULT_LOGFILE_GLOB: &'static str = "/var/log/secure*";

    /// Build settings with defaults for a given resolved config path.
    pub fn new(config_path: Utf8PathBuf) -> Self {
        Self {
            syslog_facility: Facility::default(),
            match_style: MatchStyle::default(),
            banner_path: None,
            logfile_globs: Vec::new(),
            config_path,
        }
    }

    /// The effective log-file globs: the configured ones, or the default
    /// if none were given.
    pub fn effective_logfile_globs(&self) -> Vec<String> {
        if self.logfile_globs.is_empty() {
            vec![Self::DEFAULT_LOGFILE_GLOB.to_string()]
        } else {
            self.logfile_globs.clone()
        }
    }
}
