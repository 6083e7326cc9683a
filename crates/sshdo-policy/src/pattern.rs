//! Compiles a policy command string into a matcher over candidate commands.
//!
//! A command pattern is the literal text written after the `:` in a policy
//! directive. Maximal runs of `#` stand in for digit runs observed at
//! decision time; see [`MatchStyle`] for how a run's width changes what it
//! matches.

use std::fmt;

use regex::Regex;
use thiserror::Error;

/// How `#` runs in a policy command are interpreted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MatchStyle {
    /// `#` has no special meaning; patterns are compared byte-for-byte.
    Exact,
    /// `#` runs match decimal digit runs.
    #[default]
    Digits,
    /// `#` runs match hexadecimal digit runs.
    HexDigits,
}

impl MatchStyle {
    /// Parse a `match` directive's argument (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "digits" => Some(Self::Digits),
            "hexdigits" => Some(Self::HexDigits),
            _ => None,
        }
    }

    fn alphabet(self) -> &'static str {
        match self {
            MatchStyle::Exact => "",
            MatchStyle::Digits => "0-9",
            MatchStyle::HexDigits => "0-9a-fA-F",
        }
    }
}

impl fmt::Display for MatchStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStyle::Exact => "exact",
            MatchStyle::Digits => "digits",
            MatchStyle::HexDigits => "hexdigits",
        };
        f.write_str(s)
    }
}

/// An error compiling a policy command string into a [`Pattern`].
#[derive(Debug, Error)]
#[error("invalid command pattern: {0}")]
pub struct PatternError(#[from] regex::Error);

/// A compiled matcher for a single policy command pattern.
///
/// Patterns without `#` (or compiled under [`MatchStyle::Exact`]) never
/// need a regex: they're compared by byte equality, per the invariant that
/// `exact` never introduces variable-width matching.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// Byte-for-byte comparison.
    Literal(String),
    /// An anchored `^...$` regex built from one or more `#` runs.
    Regex(Regex),
}

impl Pattern {
    /// Compile `text` under `style`.
    pub fn compile(text: &str, style: MatchStyle) -> Result<Self, PatternError> {
        if style == MatchStyle::Exact || !text.contains('#') {
            return Ok(Pattern::Literal(text.to_string()));
        }

        let mut out = String::from("^");
        let mut run_start: Option<usize> = None;

        let mut chars = text.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '#' {
                if run_start.is_none() {
                    run_start = Some(idx);
                }
                let run_ends_here = !matches!(chars.peek(), Some((_, '#')));
                if run_ends_here {
                    let start = run_start.take().expect("run_start set on entry");
                    let len = text[start..idx + c.len_utf8()].chars().count();
                    out.push_str(&digit_run(len, style));
                }
            } else {
                push_literal_char(&mut out, c);
            }
        }
        out.push('$');

        Ok(Pattern::Regex(Regex::new(&out)?))
    }

    /// Whether `cmd` matches this pattern.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            Pattern::Literal(lit) => lit == cmd,
            Pattern::Regex(re) => re.is_match(cmd),
        }
    }
}

/// Builds the regex fragment for one maximal run of `#` of length `len`.
///
/// The asymmetry is essential: a single `#` is variable-width (so `port #`
/// matches `port 1234`), while two or more `#` pin the observed width (so
/// `id ###` only matches a three-character identifier).
fn digit_run(len: usize, style: MatchStyle) -> String {
    let alphabet = style.alphabet();
    if len == 1 {
        format!("(?:#|[{alphabet}]+)")
    } else {
        format!("[#{alphabet}]{{{len}}}")
    }
}

fn push_literal_char(out: &mut String, c: char) {
    if c.is_alphanumeric() || c == '_' || c == '/' {
        out.push(c);
    } else {
        out.push_str(&regex::escape(&c.to_string()));
    }
}

/// Whether a command matches any pattern in a set, under byte-equality or
/// compiled matching (§4.3: literal presence, or a `#`-bearing pattern
/// whose compiled matcher matches the whole command).
pub fn any_matches<'a>(
    patterns: impl IntoIterator<Item = &'a str>,
    cmd: &str,
    style: MatchStyle,
) -> Result<bool, PatternError> {
    for pat in patterns {
        if pat == cmd {
            return Ok(true);
        }
        if pat.contains('#') && Pattern::compile(pat, style)?.matches(cmd) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_hash_matches_hash_and_digits() {
        let p = Pattern::compile("port #", MatchStyle::Digits).unwrap();
        assert!(p.matches("port #"));
        assert!(p.matches("port 0"));
        assert!(p.matches("port 9"));
        assert!(p.matches("port 1234"));
        assert!(!p.matches("port"));
        assert!(!p.matches("port abc"));
    }

    #[test]
    fn fixed_width_run_pins_width() {
        let p = Pattern::compile("id ###", MatchStyle::Digits).unwrap();
        assert!(p.matches("id 123"));
        assert!(p.matches("id ##1"));
        assert!(!p.matches("id 12"));
        assert!(!p.matches("id 1234"));
    }

    #[test]
    fn hexdigits_use_hex_alphabet() {
        let p = Pattern::compile("sha #", MatchStyle::HexDigits).unwrap();
        assert!(p.matches("sha deadbeef"));
        assert!(!p.matches("sha ghij"));
    }

    #[test]
    fn exact_style_is_byte_equality_even_with_hash() {
        let p = Pattern::compile("echo ###", MatchStyle::Exact).unwrap();
        assert!(p.matches("echo ###"));
        assert!(!p.matches("echo 123"));
    }

    #[test]
    fn no_hash_is_always_byte_equality() {
        let p = Pattern::compile("no-hashes", MatchStyle::Digits).unwrap();
        assert!(matches!(p, Pattern::Literal(_)));
        assert!(p.matches("no-hashes"));
        assert!(!p.matches("no-hashesx"));
    }

    #[test]
    fn special_characters_are_escaped() {
        let p = Pattern::compile("a.b*c", MatchStyle::Digits).unwrap();
        assert!(matches!(p, Pattern::Literal(_)));
        assert!(p.matches("a.b*c"));
        assert!(!p.matches("axbyc"));
    }

    #[test]
    fn multiple_runs_in_one_pattern() {
        let p = Pattern::compile("cp ## ##", MatchStyle::Digits).unwrap();
        assert!(p.matches("cp 12 34"));
        assert!(!p.matches("cp 123 34"));
    }
}
