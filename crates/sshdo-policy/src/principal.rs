//! Principals and labels: the keys of the policy tree.

use std::fmt;

use thiserror::Error;

/// A principal named in a policy directive: a user, a negated user, or a
/// group. There is no negated group.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Principal {
    /// `user`
    User(String),
    /// `-user`
    NegUser(String),
    /// `+group`
    Group(String),
}

impl Principal {
    /// The plain user or group name, stripped of its sigil.
    pub fn name(&self) -> &str {
        match self {
            Principal::User(n) | Principal::NegUser(n) | Principal::Group(n) => n,
        }
    }

    /// Whether this principal is a negative user entry (`-user`).
    pub fn is_negative_user(&self) -> bool {
        matches!(self, Principal::NegUser(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(n) => f.write_str(n),
            Principal::NegUser(n) => write!(f, "-{n}"),
            Principal::Group(n) => write!(f, "+{n}"),
        }
    }
}

/// A label, or the sentinel "any label".
///
/// `Any` matches keys that supplied no label and also matches keys that
/// did, unless a more specific entry exists for that label (§3 invariant
/// 3: `None` never clashes with a specific label for insertion purposes;
/// the decision engine consults the specific label first, then falls back
/// to `Any`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub enum Label {
    /// No label was supplied, or the directive applies regardless of label.
    #[default]
    Any,
    /// A specific short label (no whitespace, no colon).
    Named(String),
}

impl Label {
    /// Normalize an invocation-supplied label: whitespace and colons become
    /// `_` (spec §8 boundary: "a label containing space or colon is
    /// rewritten to `_`").
    pub fn normalize(raw: &str) -> Self {
        if raw.is_empty() {
            return Label::Any;
        }
        let cleaned: String = raw
            .chars()
            .map(|c| if c.is_whitespace() || c == ':' { '_' } else { c })
            .collect();
        Label::Named(cleaned)
    }

    /// This label's value as an audit-record field (§4.4): empty for
    /// `Any`, so `RecordBuilder::push` omits it entirely.
    pub fn as_field(&self) -> &str {
        match self {
            Label::Any => "",
            Label::Named(l) => l,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Any => f.write_str("*"),
            Label::Named(l) => f.write_str(l),
        }
    }
}

/// An error parsing a single principal token (e.g. `+admins/prod`).
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PrincipalParseError {
    /// The token was empty.
    #[error("empty principal")]
    Empty,
    /// The name component (after any sigil, before any `/label`) was empty.
    #[error("principal `{0}` has an empty name")]
    EmptyName(String),
}

/// Parse one space-separated principal token: `+group`, `-user`, or `user`,
/// optionally suffixed `/label`.
pub fn parse_principal(token: &str) -> Result<(Principal, Label), PrincipalParseError> {
    if token.is_empty() {
        return Err(PrincipalParseError::Empty);
    }

    let (body, label) = match token.split_once('/') {
        Some((body, label)) => (body, Label::Named(label.to_string())),
        None => (token, Label::Any),
    };

    let principal = if let Some(name) = body.strip_prefix('+') {
        Principal::Group(name.to_string())
    } else if let Some(name) = body.strip_prefix('-') {
        Principal::NegUser(name.to_string())
    } else {
        Principal::User(body.to_string())
    };

    if principal.name().is_empty() {
        return Err(PrincipalParseError::EmptyName(token.to_string()));
    }

    Ok((principal, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_user() {
        assert_eq!(
            parse_principal("alice").unwrap(),
            (Principal::User("alice".into()), Label::Any)
        );
    }

    #[test]
    fn parses_negated_user_with_label() {
        assert_eq!(
            parse_principal("-alice/old").unwrap(),
            (Principal::NegUser("alice".into()), Label::Named("old".into()))
        );
    }

    #[test]
    fn parses_group() {
        assert_eq!(
            parse_principal("+admins").unwrap(),
            (Principal::Group("admins".into()), Label::Any)
        );
    }

    #[test]
    fn rejects_empty_name() {
        assert!(parse_principal("-").is_err());
        assert!(parse_principal("+").is_err());
    }

    #[test]
    fn label_normalizes_whitespace_and_colons() {
        assert_eq!(Label::normalize("a b:c"), Label::Named("a_b_c".into()));
        assert_eq!(Label::normalize(""), Label::Any);
    }
}
