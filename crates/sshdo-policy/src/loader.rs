//! Reads the main policy file plus its sibling drop-in directory (§4.2).
//!
//! The loader never hard-fails: a missing or malformed file becomes a
//! [`Diagnostic`] and loading continues with whatever was parsed so far,
//! so that the forced-command path can still reach a (conservative)
//! decision even when the policy is half-broken.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::command;
use crate::pattern::MatchStyle;
use crate::principal::{self, Label, Principal};
use crate::settings::{Facility, Settings};
use crate::tree::{PolicyTree, TrainingSet};

/// How serious a [`Diagnostic`] is, for display purposes only — both
/// levels count equally toward `--check`'s exit code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Warning,
    Error,
}

/// A single issue found while loading or validating the policy (§7 tier 3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub file: Utf8PathBuf,
    pub line: Option<usize>,
    pub level: Level,
    pub message: String,
}

impl Diagnostic {
    fn new(file: &Utf8Path, line: Option<usize>, level: Level, message: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            line,
            level,
            message: message.into(),
        }
    }
}

/// Resolves whether a user or group name is known to the system. The
/// loader doesn't talk to the OS itself (that's an external collaborator,
/// per §1); callers inject this, and pass [`NullIdentityResolver`] when
/// unknown-identity warnings aren't wanted (i.e. outside `--check`).
pub trait IdentityResolver {
    fn user_exists(&self, name: &str) -> bool;
    fn group_exists(&self, name: &str) -> bool;
}

/// An [`IdentityResolver`] that considers every name known. Used on the
/// forced-command path, where unknown-identity diagnostics are pointless
/// (§7: "never prevent loading", and only surfaced in check mode anyway).
pub struct NullIdentityResolver;

impl IdentityResolver for NullIdentityResolver {
    fn user_exists(&self, _name: &str) -> bool {
        true
    }
    fn group_exists(&self, _name: &str) -> bool {
        true
    }
}

/// The result of loading a policy: everything the loader could make sense
/// of, plus a log of what went wrong along the way.
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub tree: PolicyTree,
    pub training: TrainingSet,
    pub settings: Settings,
    pub diagnostics: Vec<Diagnostic>,
}

struct Loader<'a> {
    tree: PolicyTree,
    training: TrainingSet,
    settings: Settings,
    diagnostics: Vec<Diagnostic>,
    syslog_seen: bool,
    match_seen: bool,
    banner_seen: bool,
    identities: &'a dyn IdentityResolver,
    check_mode: bool,
}

/// Load the policy rooted at `main_path`, plus its `<main_path>.d/`
/// drop-in directory. `check_mode` additionally enables unknown-user/group,
/// missing-banner, and missing-logfiles diagnostics, which require
/// filesystem/identity lookups that the forced-command path has no
/// reason to pay for.
pub fn load(main_path: &Utf8Path, identities: &dyn IdentityResolver, check_mode: bool) -> LoadOutcome {
    let mut loader = Loader {
        tree: PolicyTree::new(),
        training: TrainingSet::new(),
        settings: Settings::new(main_path.to_path_buf()),
        diagnostics: Vec::new(),
        syslog_seen: false,
        match_seen: false,
        banner_seen: false,
        identities,
        check_mode,
    };

    loader.load_file(main_path, true);

    let dropin_dir = Utf8PathBuf::from(format!("{main_path}.d"));
    if let Ok(entries) = fs::read_dir(&dropin_dir) {
        let mut names: Vec<_> = entries
            .filter_map(Result::ok)
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
            .collect();
        names.sort();
        for path in names {
            loader.load_file(&path, false);
        }
    }

    loader.finish()
}

impl<'a> Loader<'a> {
    fn load_file(&mut self, path: &Utf8Path, is_main: bool) {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                self.diagnostics.push(Diagnostic::new(
                    path,
                    None,
                    Level::Error,
                    format!("cannot read policy file: {e}"),
                ));
                return;
            }
        };

        for (idx, raw_line) in contents.lines().enumerate() {
            self.load_line(path, idx + 1, raw_line, is_main);
        }
    }

    fn load_line(&mut self, path: &Utf8Path, lineno: usize, raw_line: &str, is_main: bool) {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }

        let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((kw, rest)) => (kw, rest.trim_start()),
            None => (trimmed, ""),
        };

        match keyword {
            "training" => self.load_training(path, lineno, rest, is_main),
            "match" => self.load_match(path, lineno, rest, is_main),
            "syslog" => self.load_syslog(path, lineno, rest, is_main),
            "logfiles" => self.load_logfiles(path, lineno, rest, is_main),
            "banner" => self.load_banner(path, lineno, rest, is_main),
            _ if trimmed.contains(':') => self.load_authorization(path, lineno, trimmed),
            _ => self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                format!("unparseable line: {trimmed}"),
            )),
        }
    }

    fn main_only(&mut self, path: &Utf8Path, lineno: usize, is_main: bool, directive: &str) -> bool {
        if !is_main {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                format!("`{directive}` may only appear in the main policy file"),
            ));
            return false;
        }
        true
    }

    fn load_training(&mut self, path: &Utf8Path, lineno: usize, rest: &str, is_main: bool) {
        if rest.is_empty() {
            if !self.main_only(path, lineno, is_main, "training") {
                return;
            }
            self.training.set_global();
            return;
        }

        for token in rest.split_whitespace() {
            match principal::parse_principal(token) {
                Ok((principal, label)) => {
                    self.check_identity(path, lineno, &principal);
                    self.training.insert(principal, label);
                }
                Err(e) => self.diagnostics.push(Diagnostic::new(
                    path,
                    Some(lineno),
                    Level::Error,
                    format!("invalid principal `{token}`: {e}"),
                )),
            }
        }
    }

    fn load_match(&mut self, path: &Utf8Path, lineno: usize, rest: &str, is_main: bool) {
        if !self.main_only(path, lineno, is_main, "match") {
            return;
        }
        if self.match_seen {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Warning,
                "repeated `match` setting; last one wins",
            ));
        }
        match MatchStyle::parse(rest) {
            Some(style) => {
                self.settings.match_style = style;
                self.match_seen = true;
            }
            None => self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                format!("unknown match style `{rest}`"),
            )),
        }
    }

    fn load_syslog(&mut self, path: &Utf8Path, lineno: usize, rest: &str, is_main: bool) {
        if !self.main_only(path, lineno, is_main, "syslog") {
            return;
        }
        if self.syslog_seen {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Warning,
                "repeated `syslog` setting; last one wins",
            ));
        }
        match Facility::parse(rest) {
            Some(facility) => {
                self.settings.syslog_facility = facility;
                self.syslog_seen = true;
            }
            None => self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                format!("unknown syslog facility `{rest}`"),
            )),
        }
    }

    fn load_logfiles(&mut self, path: &Utf8Path, lineno: usize, rest: &str, is_main: bool) {
        if !self.main_only(path, lineno, is_main, "logfiles") {
            return;
        }
        if rest.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                "`logfiles` requires at least one glob pattern",
            ));
            return;
        }
        self.settings
            .logfile_globs
            .extend(rest.split_whitespace().map(str::to_string));
    }

    fn load_banner(&mut self, path: &Utf8Path, lineno: usize, rest: &str, is_main: bool) {
        if !self.main_only(path, lineno, is_main, "banner") {
            return;
        }
        if self.banner_seen {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Warning,
                "repeated `banner` setting; last one wins",
            ));
        }
        self.settings.banner_path = Some(Utf8PathBuf::from(rest));
        self.banner_seen = true;
    }

    fn load_authorization(&mut self, path: &Utf8Path, lineno: usize, trimmed: &str) {
        let Some((principals_part, command_part)) = trimmed.split_once(':') else {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                format!("unparseable line: {trimmed}"),
            ));
            return;
        };

        let command_part = command_part.trim();
        if command_part.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                "authorisation directive has no command",
            ));
            return;
        }

        let command = match command::decode_command(command_part) {
            Ok(cmd) => cmd,
            Err(e) => {
                self.diagnostics.push(Diagnostic::new(
                    path,
                    Some(lineno),
                    Level::Error,
                    format!("invalid command encoding: {e}"),
                ));
                return;
            }
        };

        let mut principals = Vec::new();
        for token in principals_part.split_whitespace() {
            match principal::parse_principal(token) {
                Ok((principal, label)) => principals.push((principal, label)),
                Err(e) => {
                    self.diagnostics.push(Diagnostic::new(
                        path,
                        Some(lineno),
                        Level::Error,
                        format!("invalid principal `{token}`: {e}"),
                    ));
                }
            }
        }

        if principals.is_empty() {
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Error,
                "authorisation directive has no valid principals",
            ));
            return;
        }

        for (principal, label) in principals {
            self.check_identity(path, lineno, &principal);
            self.tree.insert(principal, label, command.clone());
        }
    }

    fn check_identity(&mut self, path: &Utf8Path, lineno: usize, principal: &Principal) {
        if !self.check_mode {
            return;
        }
        let known = match principal {
            Principal::User(n) | Principal::NegUser(n) => self.identities.user_exists(n),
            Principal::Group(n) => self.identities.group_exists(n),
        };
        if !known {
            let kind = if matches!(principal, Principal::Group(_)) {
                "group"
            } else {
                "user"
            };
            self.diagnostics.push(Diagnostic::new(
                path,
                Some(lineno),
                Level::Warning,
                format!("unknown {kind} `{}`", principal.name()),
            ));
        }
    }

    fn finish(mut self) -> LoadOutcome {
        if self.check_mode {
            for clash in self.tree.authorization_clashes() {
                self.diagnostics.push(Diagnostic::new(
                    &self.settings.config_path.clone(),
                    None,
                    Level::Warning,
                    format!(
                        "`{}` has both an allow and a deny entry for `{}` under label {}",
                        clash.name, clash.command, clash.label
                    ),
                ));
            }
            for clash in self.training.clashes() {
                self.diagnostics.push(Diagnostic::new(
                    &self.settings.config_path.clone(),
                    None,
                    Level::Warning,
                    format!(
                        "`{}` has conflicting training entries under label {}",
                        clash.name, clash.label
                    ),
                ));
            }

            if let Some(banner) = &self.settings.banner_path
                && !banner.exists()
            {
                self.diagnostics.push(Diagnostic::new(
                    &self.settings.config_path.clone(),
                    None,
                    Level::Warning,
                    format!("banner file `{banner}` does not exist"),
                ));
            }

            let globs = self.settings.effective_logfile_globs();
            if sshdo_log::expand_globs(&globs).is_empty() {
                self.diagnostics.push(Diagnostic::new(
                    &self.settings.config_path.clone(),
                    None,
                    Level::Warning,
                    format!("no log files match {}", globs.join(", ")),
                ));
            }
        }

        LoadOutcome {
            tree: self.tree,
            training: self.training,
            settings: self.settings,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Utf8Path, name: &str, contents: &str) -> Utf8PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_simple_authorization() {
        let dir = tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let main = write(dir, "sshdoers", "alice: echo #\n");

        let outcome = load(&main, &NullIdentityResolver, false);
        assert!(outcome.diagnostics.is_empty());
        assert!(
            outcome
                .tree
                .matches(
                    &Principal::User("alice".into()),
                    &Label::Any,
                    "echo 42",
                    MatchStyle::Digits
                )
                .unwrap()
        );
    }

    #[test]
    fn rejects_drop_in_only_directives() {
        let dir = tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let main = write(dir, "sshdoers", "alice: ls\n");
        fs::create_dir(dir.join("sshdoers.d")).unwrap();
        write(dir.join("sshdoers.d").as_path(), "01-extra", "syslog local0\n");

        let outcome = load(&main, &NullIdentityResolver, false);
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.message.contains("main policy file"))
        );
        assert_eq!(outcome.settings.syslog_facility, Facility::Auth);
    }

    #[test]
    fn global_training_requires_main_file() {
        let dir = tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let main = write(dir, "sshdoers", "alice: ls\n");
        fs::create_dir(dir.join("sshdoers.d")).unwrap();
        write(dir.join("sshdoers.d").as_path(), "01-extra", "training\n");

        let outcome = load(&main, &NullIdentityResolver, false);
        assert!(!outcome.training.global);
    }

    #[test]
    fn selective_training_allowed_in_dropin() {
        let dir = tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let main = write(dir, "sshdoers", "alice: ls\n");
        fs::create_dir(dir.join("sshdoers.d")).unwrap();
        write(dir.join("sshdoers.d").as_path(), "01-extra", "training bob\n");

        let outcome = load(&main, &NullIdentityResolver, false);
        assert!(outcome.training.contains(&Principal::User("bob".into()), &Label::Any));
    }

    #[test]
    fn unreadable_main_file_is_a_diagnostic_not_a_panic() {
        let dir = tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let main = dir.join("does-not-exist");

        let outcome = load(&main, &NullIdentityResolver, false);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].level, Level::Error);
    }
}
