//! The policy tree and training set: `principal -> label-or-all -> ...`.

use std::collections::{HashMap, HashSet};

use crate::pattern::{self, MatchStyle, PatternError};
use crate::principal::{Label, Principal};

/// `principal -> label-or-all -> command patterns`, stored verbatim
/// (invariant 2: no canonicalisation).
#[derive(Clone, Debug, Default)]
pub struct PolicyTree {
    entries: HashMap<Principal, HashMap<Label, Vec<String>>>,
}

impl PolicyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single authorisation directive's worth of patterns under
    /// one principal/label pair.
    pub fn insert(&mut self, principal: Principal, label: Label, cmd: String) {
        self.entries
            .entry(principal)
            .or_default()
            .entry(label)
            .or_default()
            .push(cmd);
    }

    /// All principals recorded in the tree, for group-membership iteration
    /// and `--check` diagnostics.
    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    /// All `(principal, label, cmd)` triples, for the unlearn driver's
    /// policy walk.
    pub fn iter_directives(&self) -> impl Iterator<Item = (&Principal, &Label, &str)> {
        self.entries.iter().flat_map(|(principal, by_label)| {
            by_label.iter().flat_map(move |(label, cmds)| {
                cmds.iter().map(move |cmd| (principal, label, cmd.as_str()))
            })
        })
    }

    /// Whether `principal` has a command pattern (under `label` or the
    /// `Any` wildcard, label first) matching `cmd`. §4.3's label lookup:
    /// check the specific label's patterns first, then fall back to the
    /// `Any` bucket if the label itself isn't `Any`.
    pub fn matches(
        &self,
        principal: &Principal,
        label: &Label,
        cmd: &str,
        style: MatchStyle,
    ) -> Result<bool, PatternError> {
        let Some(by_label) = self.entries.get(principal) else {
            return Ok(false);
        };

        if let Some(patterns) = by_label.get(label)
            && pattern::any_matches(patterns.iter().map(String::as_str), cmd, style)?
        {
            return Ok(true);
        }

        if *label != Label::Any
            && let Some(patterns) = by_label.get(&Label::Any)
            && pattern::any_matches(patterns.iter().map(String::as_str), cmd, style)?
        {
            return Ok(true);
        }

        Ok(false)
    }

    /// Positive/negative authorisation clashes (invariant 1): a user with
    /// both a `user` and `-user` entry whose command patterns overlap
    /// (accounting for the `Any`-label wildcard on either side). Warning
    /// only; both entries are still recorded and consulted at runtime.
    pub fn authorization_clashes(&self) -> Vec<AuthClash> {
        let mut clashes = Vec::new();

        let names: HashSet<&str> = self
            .entries
            .keys()
            .filter(|p| matches!(p, Principal::User(_) | Principal::NegUser(_)))
            .map(Principal::name)
            .collect();

        for name in names {
            let pos = self.entries.get(&Principal::User(name.to_string()));
            let neg = self.entries.get(&Principal::NegUser(name.to_string()));
            let (Some(pos), Some(neg)) = (pos, neg) else {
                continue;
            };

            let labels: HashSet<&Label> = pos.keys().chain(neg.keys()).collect();
            for label in labels {
                let pos_cmds = effective_cmds(pos, label);
                let neg_cmds = effective_cmds(neg, label);
                for cmd in pos_cmds.intersection(&neg_cmds) {
                    clashes.push(AuthClash {
                        name: name.to_string(),
                        label: label.clone(),
                        command: cmd.clone(),
                    });
                }
            }
        }

        clashes
    }
}

fn effective_cmds(by_label: &HashMap<Label, Vec<String>>, label: &Label) -> HashSet<String> {
    let mut out: HashSet<String> = HashSet::new();
    if let Some(cmds) = by_label.get(label) {
        out.extend(cmds.iter().cloned());
    }
    if *label != Label::Any
        && let Some(cmds) = by_label.get(&Label::Any)
    {
        out.extend(cmds.iter().cloned());
    }
    out
}

/// A detected positive/negative authorisation clash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthClash {
    pub name: String,
    pub label: Label,
    pub command: String,
}

/// The training set: `principal -> label-or-all`, with a global marker.
#[derive(Clone, Debug, Default)]
pub struct TrainingSet {
    /// Global training (empty principal set on the directive): every
    /// user/key is under training.
    pub global: bool,
    entries: HashMap<Principal, HashSet<Label>>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self) {
        self.global = true;
    }

    pub fn insert(&mut self, principal: Principal, label: Label) {
        self.entries.entry(principal).or_default().insert(label);
    }

    /// Whether `principal` is under training for `label` (label first,
    /// then the `Any` wildcard).
    pub fn contains(&self, principal: &Principal, label: &Label) -> bool {
        let Some(labels) = self.entries.get(principal) else {
            return false;
        };
        labels.contains(label) || (*label != Label::Any && labels.contains(&Label::Any))
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.entries.keys()
    }

    /// Positive/negative training clashes, same rule as
    /// [`PolicyTree::authorization_clashes`] but over label membership
    /// rather than command patterns.
    pub fn clashes(&self) -> Vec<TrainingClash> {
        let mut clashes = Vec::new();

        let names: HashSet<&str> = self
            .entries
            .keys()
            .filter(|p| matches!(p, Principal::User(_) | Principal::NegUser(_)))
            .map(Principal::name)
            .collect();

        for name in names {
            let pos = self.entries.get(&Principal::User(name.to_string()));
            let neg = self.entries.get(&Principal::NegUser(name.to_string()));
            let (Some(pos), Some(neg)) = (pos, neg) else {
                continue;
            };

            let labels: HashSet<&Label> = pos.iter().chain(neg.iter()).collect();
            for label in labels {
                let pos_hit = pos.contains(label) || pos.contains(&Label::Any);
                let neg_hit = neg.contains(label) || neg.contains(&Label::Any);
                if pos_hit && neg_hit {
                    clashes.push(TrainingClash {
                        name: name.to_string(),
                        label: label.clone(),
                    });
                }
            }
        }

        clashes
    }
}

/// A detected positive/negative training clash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrainingClash {
    pub name: String,
    pub label: Label,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_specific_then_any_fallback() {
        let mut tree = PolicyTree::new();
        tree.insert(
            Principal::User("alice".into()),
            Label::Any,
            "ls".to_string(),
        );

        assert!(
            tree.matches(
                &Principal::User("alice".into()),
                &Label::Named("key1".into()),
                "ls",
                MatchStyle::Digits
            )
            .unwrap()
        );
    }

    #[test]
    fn specific_label_does_not_leak_to_other_labels() {
        let mut tree = PolicyTree::new();
        tree.insert(
            Principal::User("alice".into()),
            Label::Named("key1".into()),
            "ls".to_string(),
        );

        assert!(
            !tree
                .matches(
                    &Principal::User("alice".into()),
                    &Label::Named("key2".into()),
                    "ls",
                    MatchStyle::Digits
                )
                .unwrap()
        );
    }

    #[test]
    fn detects_authorization_clash() {
        let mut tree = PolicyTree::new();
        tree.insert(Principal::User("alice".into()), Label::Any, "ls".into());
        tree.insert(
            Principal::NegUser("alice".into()),
            Label::Any,
            "ls".into(),
        );

        let clashes = tree.authorization_clashes();
        assert_eq!(clashes.len(), 1);
        assert_eq!(clashes[0].name, "alice");
        assert_eq!(clashes[0].command, "ls");
    }

    #[test]
    fn training_contains_label_and_any() {
        let mut t = TrainingSet::new();
        t.insert(Principal::User("bob".into()), Label::Any);
        assert!(t.contains(&Principal::User("bob".into()), &Label::Named("x".into())));
        assert!(!t.contains(&Principal::User("carol".into()), &Label::Any));
    }
}
