//! Compatibility constraints for candidate runtime versions.
//!
//! The grammar follows the `[compat]` notation of `Project.toml`: a
//! comma-separated union of caret, tilde, equality, inequality and hyphen
//! terms. Only what is needed to filter runtime builds is supported.

use std::fmt;

use semver::Version;
use serde::Serialize;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("version specification is empty")]
    Empty,
    #[error("invalid term `{term}` in version specification `{spec}`")]
    InvalidTerm { term: String, spec: String },
}

type Triple = (u64, u64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upper {
    Exclusive(Triple),
    Inclusive(Triple),
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lower: Triple,
    lower_inclusive: bool,
    upper: Upper,
}

impl Interval {
    fn contains(&self, version: Triple) -> bool {
        let above = if self.lower_inclusive {
            version >= self.lower
        } else {
            version > self.lower
        };
        let below = match self.upper {
            Upper::Exclusive(bound) => version < bound,
            Upper::Inclusive(bound) => version <= bound,
            Upper::Unbounded => true,
        };
        above && below
    }
}

/// A parsed compatibility specification plus the prerelease policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConstraint {
    spec: String,
    strict: bool,
    #[serde(skip)]
    intervals: Vec<Interval>,
}

impl VersionConstraint {
    /// Parses `spec`. With `strict` set, prerelease builds never satisfy.
    ///
    /// # Errors
    /// Returns [`ConstraintError`] when the specification is empty or a term
    /// cannot be parsed.
    pub fn parse(spec: &str, strict: bool) -> Result<Self, ConstraintError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(ConstraintError::Empty);
        }
        let mut intervals = Vec::new();
        for term in trimmed.split(',') {
            let term = term.trim();
            let interval = parse_term(term).ok_or_else(|| ConstraintError::InvalidTerm {
                term: term.to_string(),
                spec: trimmed.to_string(),
            })?;
            intervals.push(interval);
        }
        Ok(Self {
            spec: trimmed.to_string(),
            strict,
            intervals,
        })
    }

    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    #[must_use]
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Tests a version string reported by a runtime.
    ///
    /// Unparseable versions never satisfy.
    #[must_use]
    pub fn satisfies(&self, version: &str) -> bool {
        let Some(parsed) = parse_runtime_version(version) else {
            return false;
        };
        if self.strict && !parsed.pre.is_empty() {
            return false;
        }
        let triple = (parsed.major, parsed.minor, parsed.patch);
        self.intervals
            .iter()
            .any(|interval| interval.contains(triple))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)?;
        if !self.strict {
            f.write_str(" (prereleases allowed)")?;
        }
        Ok(())
    }
}

/// Parses a full runtime version such as `1.9.3` or `v1.10.0-rc1`.
#[must_use]
pub fn parse_runtime_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}

fn parse_term(term: &str) -> Option<Interval> {
    if term.is_empty() {
        return None;
    }
    if let Some((low, high)) = term.split_once(" - ") {
        let low = parse_parts(low)?;
        let high = parse_parts(high)?;
        return Some(Interval {
            lower: fill(&low),
            lower_inclusive: true,
            upper: if high.len() == 3 {
                Upper::Inclusive(fill(&high))
            } else {
                Upper::Exclusive(bump_last(&high)?)
            },
        });
    }
    let operators: [(&str, fn(Vec<u64>) -> Option<Interval>); 10] = [
        (">=", |parts| Some(at_least(fill(&parts), true))),
        ("≥", |parts| Some(at_least(fill(&parts), true))),
        ("<=", |parts| Some(at_most(Upper::Inclusive(fill(&parts))))),
        ("≤", |parts| Some(at_most(Upper::Inclusive(fill(&parts))))),
        (">", |parts| Some(at_least(fill(&parts), false))),
        ("<", |parts| Some(at_most(Upper::Exclusive(fill(&parts))))),
        ("=", |parts| Some(exact(fill(&parts)))),
        ("^", caret),
        ("~", tilde),
        ("", caret),
    ];
    for (prefix, build) in operators {
        if let Some(rest) = term.strip_prefix(prefix) {
            return parse_parts(rest).and_then(build);
        }
    }
    None
}

fn parse_parts(raw: &str) -> Option<Vec<u64>> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    let parts = raw
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    (1..=3).contains(&parts.len()).then_some(parts)
}

fn fill(parts: &[u64]) -> Triple {
    (
        parts.first().copied().unwrap_or(0),
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    )
}

/// `None` when the bumped component does not fit in a `u64`.
fn bump_at(parts: &[u64], index: usize) -> Option<Triple> {
    let mut bumped = [0u64; 3];
    for (slot, value) in bumped.iter_mut().zip(parts.iter()).take(index) {
        *slot = *value;
    }
    bumped[index] = parts.get(index).copied().unwrap_or(0).checked_add(1)?;
    Some((bumped[0], bumped[1], bumped[2]))
}

fn bump_last(parts: &[u64]) -> Option<Triple> {
    bump_at(parts, parts.len() - 1)
}

fn at_least(lower: Triple, inclusive: bool) -> Interval {
    Interval {
        lower,
        lower_inclusive: inclusive,
        upper: Upper::Unbounded,
    }
}

fn at_most(upper: Upper) -> Interval {
    Interval {
        lower: (0, 0, 0),
        lower_inclusive: true,
        upper,
    }
}

fn exact(version: Triple) -> Interval {
    Interval {
        lower: version,
        lower_inclusive: true,
        upper: Upper::Inclusive(version),
    }
}

fn caret(parts: Vec<u64>) -> Option<Interval> {
    let index = parts
        .iter()
        .position(|part| *part != 0)
        .unwrap_or(parts.len() - 1);
    Some(Interval {
        lower: fill(&parts),
        lower_inclusive: true,
        upper: Upper::Exclusive(bump_at(&parts, index)?),
    })
}

fn tilde(parts: Vec<u64>) -> Option<Interval> {
    let index = match parts.as_slice() {
        [_] => 0,
        [0, 0, _] => 2,
        _ => 1,
    };
    Some(Interval {
        lower: fill(&parts),
        lower_inclusive: true,
        upper: Upper::Exclusive(bump_at(&parts, index)?),
    })
}
