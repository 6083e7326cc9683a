//! The decision engine (§4.3): `decide(policy, user, groups, label, cmd)`.
//!
//! Pattern compilation is infallible for anything the loader accepted
//! (every pattern it stores came straight from policy text the compiler
//! already proved buildable against the active style), so a spurious
//! [`sshdo_policy::PatternError`] here is treated as a non-match rather
//! than propagated — the decision engine never fails; the default
//! outcome is always `Disallowed`.

use sshdo_policy::{Label, MatchStyle, PolicyTree, Principal, TrainingSet};

/// One of the five outcomes a decision can produce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Allowed,
    AllowedByGroup(String),
    Training,
    TrainingByGroup(String),
    Disallowed,
}

impl Outcome {
    /// The group name behind a group-mediated outcome, if any.
    pub fn group(&self) -> Option<&str> {
        match self {
            Outcome::AllowedByGroup(g) | Outcome::TrainingByGroup(g) => Some(g.as_str()),
            _ => None,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Outcome::Allowed | Outcome::AllowedByGroup(_))
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Outcome::Training | Outcome::TrainingByGroup(_))
    }
}

/// Resolution order, first hit wins (§4.3):
/// `NegUser` → `User` → groups → training (global/`NegUser`/`User`/groups)
/// → `Disallowed`.
pub fn decide(
    tree: &PolicyTree,
    training: &TrainingSet,
    style: MatchStyle,
    user: &str,
    groups: &[String],
    label: &Label,
    cmd: &str,
) -> Outcome {
    let neg_user = Principal::NegUser(user.to_string());
    if matches(tree, &neg_user, label, cmd, style) {
        return Outcome::Disallowed;
    }

    let pos_user = Principal::User(user.to_string());
    if matches(tree, &pos_user, label, cmd, style) {
        return Outcome::Allowed;
    }

    for group in groups {
        let principal = Principal::Group(group.clone());
        if matches(tree, &principal, label, cmd, style) {
            return Outcome::AllowedByGroup(group.clone());
        }
    }

    if training.global {
        return Outcome::Training;
    }
    if training.contains(&neg_user, label) {
        return Outcome::Disallowed;
    }
    if training.contains(&pos_user, label) {
        return Outcome::Training;
    }
    for group in groups {
        let principal = Principal::Group(group.clone());
        if training.contains(&principal, label) {
            return Outcome::TrainingByGroup(group.clone());
        }
    }

    Outcome::Disallowed
}

fn matches(tree: &PolicyTree, principal: &Principal, label: &Label, cmd: &str, style: MatchStyle) -> bool {
    tree.matches(principal, label, cmd, style).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> (PolicyTree, TrainingSet) {
        (PolicyTree::new(), TrainingSet::new())
    }

    #[test]
    fn neg_user_wins_over_everything() {
        let (mut tree, training) = empty();
        tree.insert(Principal::User("alice".into()), Label::Any, "ls".into());
        tree.insert(
            Principal::NegUser("alice".into()),
            Label::Any,
            "ls".into(),
        );

        let outcome = decide(
            &tree,
            &training,
            MatchStyle::Digits,
            "alice",
            &[],
            &Label::Any,
            "ls",
        );
        assert_eq!(outcome, Outcome::Disallowed);
    }

    #[test]
    fn group_membership_authorises() {
        let (mut tree, training) = empty();
        tree.insert(Principal::Group("admins".into()), Label::Any, "uptime".into());
        tree.insert(
            Principal::NegUser("mallory".into()),
            Label::Any,
            "uptime".into(),
        );

        let outcome = decide(
            &tree,
            &training,
            MatchStyle::Digits,
            "mallory",
            &["admins".to_string()],
            &Label::Any,
            "uptime",
        );
        assert_eq!(outcome, Outcome::Disallowed);
    }

    #[test]
    fn group_authorises_unrelated_user() {
        let (mut tree, training) = empty();
        tree.insert(Principal::Group("admins".into()), Label::Any, "uptime".into());

        let outcome = decide(
            &tree,
            &training,
            MatchStyle::Digits,
            "carol",
            &["admins".to_string()],
            &Label::Any,
            "uptime",
        );
        assert_eq!(outcome, Outcome::AllowedByGroup("admins".to_string()));
    }

    #[test]
    fn global_training_allows_unknown_user() {
        let (tree, mut training) = empty();
        training.set_global();

        let outcome = decide(
            &tree,
            &training,
            MatchStyle::Digits,
            "dan",
            &[],
            &Label::Any,
            "rm -rf /",
        );
        assert_eq!(outcome, Outcome::Training);
    }

    #[test]
    fn no_match_anywhere_is_disallowed() {
        let (tree, training) = empty();
        let outcome = decide(
            &tree,
            &training,
            MatchStyle::Digits,
            "eve",
            &[],
            &Label::Any,
            "ls",
        );
        assert_eq!(outcome, Outcome::Disallowed);
    }
}
