//! The coalescer (§4.6): folds observed commands plus per-principal
//! allow/deny marks into a minimal set of digit-pattern directives.
//!
//! This is the algorithmic heart of the learn/unlearn drivers. The
//! "merge into every similar neighbour" rule in [`coalesce`] looks
//! redundant at first glance — in practice at most one working-list
//! entry ever shares a given shape — but it's what the source leans on
//! to keep the result independent of input order, and test S3-style
//! cases pin it, so the loop deliberately doesn't stop at the first
//! match.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use sshdo_policy::MatchStyle;

/// Whether a principal is allowed (`""`) or denied/commented (`"# "`) for
/// a given command, per §4.6's `obs[cmd][principal] ∈ {"", "#"}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mark {
    Allowed,
    Disallowed,
}

/// Which direction the driver is running in, since the two differ only in
/// how a principal mark conflict is resolved on merge (§4.6 step 3, §9's
/// "open question" — the asymmetry is preserved deliberately, not fixed).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flavor {
    Learn,
    Unlearn,
}

impl Flavor {
    fn resolve_conflict(self) -> Mark {
        match self {
            Flavor::Learn => Mark::Disallowed,
            Flavor::Unlearn => Mark::Allowed,
        }
    }
}

/// `obs[cmd][principal]`, keyed so iteration is already in the sorted
/// order §4.6 step 3 requires.
pub type Observations = BTreeMap<String, BTreeMap<String, Mark>>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Digit(DigitSlot),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DigitSlot {
    /// `Some(d)` while every merged observation agreed on the exact digit
    /// text; `None` once two observations disagreed (forced variable).
    literal: Option<String>,
    /// `Some("#" * k)` while every merged observation agreed on width
    /// `k > 1`; `None` for single-`#` runs or once widths disagreed.
    fixed: Option<String>,
}

static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[#0-9]+").unwrap());
static HEX_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[#0-9a-fA-F]+").unwrap());

fn digit_run_regex(style: MatchStyle) -> &'static Regex {
    match style {
        MatchStyle::Digits => &DIGIT_RUN_RE,
        MatchStyle::HexDigits => &HEX_RUN_RE,
        MatchStyle::Exact => unreachable!("exact style short-circuits before segmentation"),
    }
}

fn segment(cmd: &str, style: MatchStyle) -> Vec<Segment> {
    let re = digit_run_regex(style);
    let mut segments = Vec::new();
    let mut last = 0;

    for m in re.find_iter(cmd) {
        if m.start() > last {
            segments.push(Segment::Literal(cmd[last..m.start()].to_string()));
        }
        let run = m.as_str();
        let len = run.chars().count();
        segments.push(Segment::Digit(DigitSlot {
            literal: Some(run.to_string()),
            fixed: (len > 1).then(|| "#".repeat(len)),
        }));
        last = m.end();
    }
    if last < cmd.len() {
        segments.push(Segment::Literal(cmd[last..].to_string()));
    }

    segments
}

/// Same length, equal literal segments, digit slots aligned with digit
/// slots — the specific candidate values inside a digit slot don't enter
/// into similarity, only position and kind (§4.6 step 2).
fn similar(a: &[Segment], b: &[Segment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|pair| match pair {
            (Segment::Literal(x), Segment::Literal(y)) => x == y,
            (Segment::Digit(_), Segment::Digit(_)) => true,
            _ => false,
        })
}

fn merge_slot(a: &DigitSlot, b: &DigitSlot) -> DigitSlot {
    DigitSlot {
        literal: (a.literal == b.literal).then(|| a.literal.clone()).flatten(),
        fixed: (a.fixed == b.fixed).then(|| a.fixed.clone()).flatten(),
    }
}

struct Entry {
    shape: Vec<Segment>,
    principals: BTreeMap<String, Mark>,
}

fn merge_entry(entry: &mut Entry, incoming_shape: &[Segment], incoming: &BTreeMap<String, Mark>, flavor: Flavor) {
    for (slot, other) in entry.shape.iter_mut().zip(incoming_shape) {
        if let (Segment::Digit(a), Segment::Digit(b)) = (slot, other) {
            *a = merge_slot(a, b);
        }
    }

    for (principal, mark) in incoming {
        entry
            .principals
            .entry(principal.clone())
            .and_modify(|existing| {
                if *existing != *mark {
                    *existing = flavor.resolve_conflict();
                }
            })
            .or_insert(*mark);
    }
}

fn render(shape: &[Segment]) -> String {
    let mut out = String::new();
    for seg in shape {
        match seg {
            Segment::Literal(text) => out.push_str(text),
            Segment::Digit(slot) => {
                if let Some(lit) = &slot.literal {
                    out.push_str(lit);
                } else if let Some(fixed) = &slot.fixed {
                    out.push_str(fixed);
                } else {
                    out.push('#');
                }
            }
        }
    }
    out
}

/// Fold `obs` into a minimal set of digit-pattern directives. Identity
/// under [`MatchStyle::Exact`] (§8: `coalesce(obs, exact) = obs`).
pub fn coalesce(obs: &Observations, style: MatchStyle, flavor: Flavor) -> Observations {
    if style == MatchStyle::Exact {
        return obs.clone();
    }

    let mut entries: Vec<Entry> = Vec::new();

    for (cmd, principals) in obs {
        let shape = segment(cmd, style);
        let mut merged = false;

        for entry in entries.iter_mut() {
            if similar(&entry.shape, &shape) {
                merge_entry(entry, &shape, principals, flavor);
                merged = true;
            }
        }

        if !merged {
            entries.push(Entry {
                shape,
                principals: principals.clone(),
            });
        }
    }

    entries
        .into_iter()
        .map(|e| (render(&e.shape), e.principals))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(pairs: &[(&str, &str, Mark)]) -> Observations {
        let mut out: Observations = BTreeMap::new();
        for (cmd, principal, mark) in pairs {
            out.entry(cmd.to_string())
                .or_default()
                .insert(principal.to_string(), *mark);
        }
        out
    }

    #[test]
    fn three_widths_collapse_to_single_hash() {
        let o = obs(&[
            ("job 1", "bob", Mark::Allowed),
            ("job 12", "bob", Mark::Allowed),
            ("job 345", "bob", Mark::Allowed),
        ]);
        let result = coalesce(&o, MatchStyle::Digits, Flavor::Learn);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("job #"));
    }

    #[test]
    fn consistent_width_keeps_fixed_form() {
        let o = obs(&[
            ("backup 001", "carol", Mark::Allowed),
            ("backup 002", "carol", Mark::Allowed),
        ]);
        let result = coalesce(&o, MatchStyle::Digits, Flavor::Unlearn);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("backup ###"));
    }

    #[test]
    fn identity_under_exact_style() {
        let o = obs(&[("job 1", "bob", Mark::Allowed), ("job 12", "bob", Mark::Allowed)]);
        let result = coalesce(&o, MatchStyle::Exact, Flavor::Learn);
        assert_eq!(result, o);
    }

    #[test]
    fn learn_mode_disallowed_wins_on_conflict() {
        let o = obs(&[
            ("ls", "alice", Mark::Allowed),
            ("ls", "alice", Mark::Disallowed),
        ]);
        let result = coalesce(&o, MatchStyle::Digits, Flavor::Learn);
        assert_eq!(result["ls"]["alice"], Mark::Disallowed);
    }

    #[test]
    fn unlearn_mode_allowed_wins_on_conflict() {
        let mut o: Observations = BTreeMap::new();
        o.insert(
            "ls".to_string(),
            BTreeMap::from([("alice".to_string(), Mark::Allowed)]),
        );
        let mut conflicting = BTreeMap::new();
        conflicting.insert("alice".to_string(), Mark::Disallowed);
        // simulate a second observation of the same cmd with a conflicting mark
        let merged = {
            let mut e = Entry {
                shape: segment("ls", MatchStyle::Digits),
                principals: o["ls"].clone(),
            };
            merge_entry(&mut e, &segment("ls", MatchStyle::Digits), &conflicting, Flavor::Unlearn);
            e.principals
        };
        assert_eq!(merged["alice"], Mark::Allowed);
    }

    #[test]
    fn different_shapes_stay_separate() {
        let o = obs(&[
            ("job 1", "bob", Mark::Allowed),
            ("deploy 1", "bob", Mark::Allowed),
        ]);
        let result = coalesce(&o, MatchStyle::Digits, Flavor::Learn);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn order_independence_across_three_widths() {
        let forward = obs(&[
            ("job 1", "bob", Mark::Allowed),
            ("job 12", "bob", Mark::Allowed),
            ("job 345", "bob", Mark::Allowed),
        ]);
        let backward = obs(&[
            ("job 345", "bob", Mark::Allowed),
            ("job 12", "bob", Mark::Allowed),
            ("job 1", "bob", Mark::Allowed),
        ]);
        assert_eq!(
            coalesce(&forward, MatchStyle::Digits, Flavor::Learn),
            coalesce(&backward, MatchStyle::Digits, Flavor::Learn)
        );
    }
}
