//! Policy data model, pattern compiler, and config loader for sshdo.
//!
//! This crate has no notion of the OS (no user/group lookup, no process
//! execution) and no notion of syslog transport — it only knows how to
//! parse a policy file into a [`tree::PolicyTree`]/[`tree::TrainingSet`]
//! pair and how to decide whether a command matches a stored pattern.
//! The `sshdo` binary crate supplies the OS glue via [`loader::IdentityResolver`].

pub mod command;
pub mod loader;
pub mod pattern;
pub mod principal;
pub mod settings;
pub mod tree;

pub use command::{CommandDecodeError, INTERACTIVE, decode_command};
pub use loader::{Diagnostic, IdentityResolver, Level, LoadOutcome, NullIdentityResolver, load};
pub use pattern::{MatchStyle, Pattern, PatternError};
pub use principal::{Label, Principal, PrincipalParseError, parse_principal};
pub use settings::{Facility, Settings};
pub use tree::{AuthClash, PolicyTree, TrainingClash, TrainingSet};
