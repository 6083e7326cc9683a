//! The unlearn driver (§4.8): finds policy directives nothing in the log
//! actually exercised any more, and proposes commenting them out.

use std::collections::{BTreeMap, BTreeSet};

use sshdo_log::{Record, RecordType};
use sshdo_policy::{Label, Pattern, PolicyTree, Settings};

use crate::coalesce::{self, Flavor, Mark, Observations};
use crate::learn::{principal_string, render_directives};

pub struct UnlearnOptions {
    pub accepting: bool,
}

/// `principal -> label -> observed commands`, built from the log.
type Used = BTreeMap<String, BTreeMap<Label, BTreeSet<String>>>;

pub fn unlearn(tree: &PolicyTree, settings: &Settings, records: impl Iterator<Item = Record>, opts: &UnlearnOptions) -> String {
    let used = build_used(settings, records, opts);

    let mut current: Observations = BTreeMap::new();
    for (principal, label, cmd) in tree.iter_directives() {
        let keep = principal.is_negative_user() || directive_is_used(&used, principal.to_string().as_str(), label, cmd, settings);

        let key = match label {
            Label::Any => principal.to_string(),
            Label::Named(l) => format!("{principal}/{l}"),
        };
        let mark = if keep { Mark::Allowed } else { Mark::Disallowed };
        current.entry(cmd.to_string()).or_default().insert(key, mark);
    }

    let coalesced = coalesce::coalesce(&current, settings.match_style, Flavor::Unlearn);
    render_directives(&coalesced)
}

fn build_used(settings: &Settings, records: impl Iterator<Item = Record>, opts: &UnlearnOptions) -> Used {
    let mut used: Used = BTreeMap::new();

    for record in records {
        if !config_matches(&record, settings) {
            continue;
        }
        let Some(record_type) = record.record_type.as_deref().and_then(RecordType::parse) else {
            continue;
        };
        let keep_type = match record_type {
            RecordType::Allowed | RecordType::Training => true,
            RecordType::Disallowed => opts.accepting,
            RecordType::ConfigError | RecordType::ExecError => false,
        };
        if !keep_type {
            continue;
        }

        let Some(user) = record.user() else { continue };
        let Some(cmd) = record.command() else { continue };
        if cmd == sshdo_policy::INTERACTIVE {
            continue;
        }

        let label = Label::normalize(record.label().unwrap_or(""));
        // Keyed on the bare principal (no label suffix) so it lines up
        // with `Principal::to_string()`, the form `directive_is_used`
        // looks records up by; the label itself is the second tier.
        let key = principal_string(record.group(), user, None);

        used.entry(key).or_default().entry(label).or_default().insert(cmd.to_string());
    }

    used
}

/// A `None` config field was logged under the default policy, so it only
/// matches the active config when the active config *is* the default.
fn config_matches(record: &Record, settings: &Settings) -> bool {
    match record.config() {
        None => settings.config_path.as_str() == crate::DEFAULT_CONFIG_PATH,
        Some(path) => settings.config_path.as_str() == path,
    }
}

/// Whether any command observed for `(principal, label)` — or, failing
/// that, observed for `principal` under any label — matches `cmd` as a
/// digit pattern.
fn directive_is_used(used: &Used, principal: &str, label: &Label, cmd: &str, settings: &Settings) -> bool {
    let Ok(pattern) = Pattern::compile(cmd, settings.match_style) else {
        return true; // an uncompilable pattern is never safe to drop
    };

    let Some(by_label) = used.get(principal) else {
        return false;
    };

    if let Some(cmds) = by_label.get(label)
        && cmds.iter().any(|observed| pattern.matches(observed))
    {
        return true;
    }

    // The "any label" fallback only applies to an any-label directive
    // itself; a directive scoped to a specific named label must be kept
    // alive by usage under that same label, not by unrelated labels.
    matches!(label, Label::Any)
        && by_label
            .values()
            .any(|cmds| cmds.iter().any(|observed| pattern.matches(observed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshdo_log::RecordBuilder;
    use sshdo_policy::Principal;

    fn record(record_type: RecordType, user: &str, cmd: &str) -> Record {
        let mut b = RecordBuilder::new(record_type);
        b.push("user", user);
        b.push("command", cmd);
        let line = format!("Jan 1 00:00:00 host sshdo[1]: {}", b.render());
        sshdo_log::record::parse_line(&line, "sshdo").unwrap().unwrap()
    }

    fn record_with_label(record_type: RecordType, user: &str, label: &str, cmd: &str) -> Record {
        let mut b = RecordBuilder::new(record_type);
        b.push("user", user);
        b.push("label", label);
        b.push("command", cmd);
        let line = format!("Jan 1 00:00:00 host sshdo[1]: {}", b.render());
        sshdo_log::record::parse_line(&line, "sshdo").unwrap().unwrap()
    }

    #[test]
    fn unused_directive_is_commented_out() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Any, "ls".into());
        let settings = Settings::new("/etc/sshdoers".into());

        let out = unlearn(&tree, &settings, std::iter::empty(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "# alice: ls");
    }

    #[test]
    fn exercised_directive_is_kept() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Any, "ls".into());
        let settings = Settings::new("/etc/sshdoers".into());
        let records = vec![record(RecordType::Allowed, "alice", "ls")];

        let out = unlearn(&tree, &settings, records.into_iter(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "alice: ls");
    }

    #[test]
    fn negative_user_entries_are_always_kept() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::NegUser("mallory".into()), Label::Any, "ls".into());
        let settings = Settings::new("/etc/sshdoers".into());

        let out = unlearn(&tree, &settings, std::iter::empty(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "-mallory: ls");
    }

    #[test]
    fn digit_pattern_is_kept_when_observed_width_matches() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("bob".into()), Label::Any, "job #".into());
        let settings = Settings::new("/etc/sshdoers".into());
        let records = vec![record(RecordType::Allowed, "bob", "job 42")];

        let out = unlearn(&tree, &settings, records.into_iter(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "bob: job #");
    }

    /// A directive scoped to a specific named label isn't kept alive by
    /// usage logged under an unrelated (any-label) invocation.
    #[test]
    fn named_label_directive_is_not_kept_by_unrelated_label_usage() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Named("prod".into()), "ls".into());
        let settings = Settings::new("/etc/sshdoers".into());
        let records = vec![record(RecordType::Allowed, "alice", "ls")];

        let out = unlearn(&tree, &settings, records.into_iter(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "# alice/prod: ls");
    }

    /// A directive scoped to a specific named label is kept alive by usage
    /// logged under that same label.
    #[test]
    fn named_label_directive_is_kept_by_matching_label_usage() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Named("prod".into()), "ls".into());
        let settings = Settings::new("/etc/sshdoers".into());
        let records = vec![record_with_label(RecordType::Allowed, "alice", "prod", "ls")];

        let out = unlearn(&tree, &settings, records.into_iter(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "alice/prod: ls");
    }

    #[test]
    fn record_without_config_field_is_dropped_under_non_default_config() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Any, "ls".into());
        let settings = Settings::new("/etc/sshdoers.other".into());
        let records = vec![record(RecordType::Allowed, "alice", "ls")];

        let out = unlearn(&tree, &settings, records.into_iter(), &UnlearnOptions { accepting: false });
        assert_eq!(out, "# alice: ls");
    }
}
