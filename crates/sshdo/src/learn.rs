//! The learn driver (§4.7): mines training/disallowed audit records and
//! proposes new policy directives for whatever the policy doesn't cover
//! yet.

use std::collections::{BTreeMap, HashSet};

use sshdo_log::{Record, RecordType};
use sshdo_policy::{Label, PolicyTree, Settings, TrainingSet, command};

use crate::coalesce::{self, Flavor, Mark, Observations};
use crate::decision;

pub struct LearnOptions {
    pub accepting: bool,
}

/// Run the learn driver over an already-streamed record iterator and
/// return the proposed directives, one per line.
pub fn learn(
    tree: &PolicyTree,
    training: &TrainingSet,
    settings: &Settings,
    groups_for: impl Fn(&str) -> Vec<String>,
    records: impl Iterator<Item = Record>,
    opts: &LearnOptions,
) -> String {
    let mut obs: Observations = BTreeMap::new();

    for record in records {
        if !config_matches(&record, settings) {
            continue;
        }
        let Some(record_type) = record.record_type.as_deref().and_then(RecordType::parse) else {
            continue;
        };
        if !matches!(record_type, RecordType::Training | RecordType::Disallowed) {
            continue;
        }

        let Some(user) = record.user() else { continue };
        let Some(cmd) = record.command() else { continue };

        let label = Label::normalize(record.label().unwrap_or(""));
        let groups = groups_for(user);
        let outcome = decision::decide(tree, training, settings.match_style, user, &groups, &label, cmd);
        if outcome.is_allow() {
            continue;
        }

        let principal = principal_string(record.group(), user, record.label());
        let mark = if cmd == sshdo_policy::INTERACTIVE {
            Mark::Disallowed
        } else if record_type == RecordType::Disallowed && !opts.accepting {
            Mark::Disallowed
        } else {
            Mark::Allowed
        };

        let entry = obs.entry(cmd.to_string()).or_default();
        entry
            .entry(principal)
            .and_modify(|existing| {
                // Same (cmd, principal) pair seen with both marks in the
                // raw log: the allowed observation prevails (§4.7 step 4),
                // independently of the coalescer's own learn/unlearn
                // conflict rule, which only applies once distinct cmd
                // strings are merged into one pattern.
                if *existing != mark {
                    *existing = Mark::Allowed;
                }
            })
            .or_insert(mark);
    }

    let coalesced = coalesce::coalesce(&obs, settings.match_style, Flavor::Learn);
    render_directives(&coalesced)
}

/// A `None` config field was logged under the default policy, so it only
/// matches the active config when the active config *is* the default.
fn config_matches(record: &Record, settings: &Settings) -> bool {
    match record.config() {
        None => settings.config_path.as_str() == crate::DEFAULT_CONFIG_PATH,
        Some(path) => settings.config_path.as_str() == path,
    }
}

/// `user`, or `+group` if the record was decided by group membership;
/// suffixed `/label` unless the record carried no label.
pub(crate) fn principal_string(group: Option<&str>, user: &str, label: Option<&str>) -> String {
    let base = match group {
        Some(g) => format!("+{g}"),
        None => user.to_string(),
    };
    match label {
        Some(l) if !l.is_empty() => format!("{base}/{l}"),
        _ => base,
    }
}

/// Render coalesced observations as policy-file lines: an allow line
/// followed by a commented deny line, per command, skipping empty
/// sides. Principals with a narrower `user/label` form are dropped when
/// the bare `user` (any label) already covers them.
pub(crate) fn render_directives(coalesced: &Observations) -> String {
    let mut lines = Vec::new();

    for (cmd, principals) in coalesced {
        let encoded = command::encode_command(cmd);

        let mut allowed: Vec<&str> = principals
            .iter()
            .filter(|(_, m)| **m == Mark::Allowed)
            .map(|(p, _)| p.as_str())
            .collect();
        let mut denied: Vec<&str> = principals
            .iter()
            .filter(|(_, m)| **m == Mark::Disallowed)
            .map(|(p, _)| p.as_str())
            .collect();

        suppress_redundant(&mut allowed);
        suppress_redundant(&mut denied);
        allowed.sort_unstable();
        denied.sort_unstable();

        if !allowed.is_empty() {
            lines.push(format!("{}: {}", allowed.join(" "), encoded));
        }
        if !denied.is_empty() {
            lines.push(format!("# {}: {}", denied.join(" "), encoded));
        }
    }

    lines.join("\n")
}

fn suppress_redundant(principals: &mut Vec<&str>) {
    let any_label_bases: HashSet<&str> = principals.iter().filter(|p| !p.contains('/')).copied().collect();
    principals.retain(|p| match p.split_once('/') {
        Some((base, _)) => !any_label_bases.contains(base),
        None => true,
    });
}
