//! Structured audit-record grammar for sshdo: escaping, rendering, parsing,
//! and log-source streaming. Shared between the audit emitter (which
//! writes this format) and the learn/unlearn drivers (which read it back).

pub mod escape;
pub mod record;
pub mod source;

pub use escape::{UnescapeError, escape, unescape};
pub use record::{Priority, Record, RecordBuilder, RecordParseError, RecordType};
pub use source::{SourceError, expand_globs, open_lines};
