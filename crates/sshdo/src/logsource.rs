//! Resolves which log files the learn/unlearn drivers read, and turns
//! them into a lazy stream of parsed records (§4.5, §4.7, §4.8).
//!
//! Opening every source up front (rather than lazily, one at a time) is
//! deliberate: an unreadable log file in learn/unlearn is a tier-1 fatal
//! error (§7) that should be reported before any work happens, not
//! discovered partway through streaming.

use std::io;

use sshdo_log::{Record, SourceError};
use sshdo_policy::Settings;

type LineSource = Box<dyn Iterator<Item = io::Result<String>>>;

/// The log file paths to read, in priority order: explicit CLI arguments,
/// else the configured `logfiles` globs, else the platform default (§6).
pub fn resolve_paths(explicit: &[String], settings: &Settings) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    sshdo_log::expand_globs(&settings.effective_logfile_globs())
        .into_iter()
        .map(|p| p.into_string())
        .collect()
}

/// Open every path, failing fast on the first unreadable one.
pub fn open_sources(paths: &[String]) -> Result<Vec<LineSource>, SourceError> {
    paths.iter().map(|p| sshdo_log::open_lines(p)).collect()
}

/// Stream parsed records out of already-opened sources, skipping lines
/// that aren't candidates or that fail to parse (§4.5: "a miss means
/// skip silently").
pub fn records_from_sources(sources: Vec<LineSource>, progname: &str) -> impl Iterator<Item = Record> {
    let progname = progname.to_string();
    sources.into_iter().flatten().filter_map(move |line| {
        let line = line.ok()?;
        sshdo_log::record::parse_line(&line, &progname).ok().flatten()
    })
}
