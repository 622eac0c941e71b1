//! Release tag normalization and ordering
//!
//! Publishers tag releases either with dotted versions (`v1.4.2`) or with
//! build timestamps (`auto-20251110-0756`). Tags are cleaned once on entry
//! and the cleaned form is what gets compared and persisted.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use semver::Prerelease;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-?(\d{2})-?(\d{2})(?:-?(\d{2})(\d{2}))?$")
        .expect("timestamp regex is valid")
});

/// Strip cosmetic prefixes from a raw tag
///
/// Trims whitespace, then a case-insensitive `auto-` prefix, then a single
/// `v`/`V`.
pub fn normalize(raw: &str) -> String {
    let mut tag = raw.trim();
    if tag
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("auto-"))
    {
        tag = &tag[5..];
    }
    if let Some(rest) = tag.strip_prefix(|c: char| c == 'v' || c == 'V') {
        tag = rest;
    }
    tag.trim().to_string()
}

/// Result of comparing two tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOrdering {
    Less,
    Equal,
    Greater,
    /// Neither a numeric nor a timestamp reading applies to both tags
    Incomparable,
}

impl From<Ordering> for TagOrdering {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => TagOrdering::Less,
            Ordering::Equal => TagOrdering::Equal,
            Ordering::Greater => TagOrdering::Greater,
        }
    }
}

/// A cleaned release tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VersionTag(String);

impl VersionTag {
    /// Clean `raw` into a tag; never fails
    pub fn parse(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty tag means "unknown"
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Only digits and dots remain after cleaning
    pub fn looks_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_digit() || c == '.')
    }

    /// The tag reads as a build timestamp
    pub fn is_timestamp(&self) -> bool {
        parse_timestamp(&self.0).is_some()
    }

    /// Form shown to users: numeric tags gain a `v` prefix
    pub fn display(&self) -> String {
        if self.looks_numeric() {
            format!("v{}", self.0)
        } else {
            self.0.clone()
        }
    }

    /// Order two tags
    ///
    /// Identical tags (ignoring case) are equal. Two timestamps are ordered
    /// chronologically, even when they also read as bare numbers. Otherwise
    /// both tags are read as dotted versions. A timestamp is newer than any
    /// dotted version. Anything else is incomparable.
    pub fn compare(&self, other: &VersionTag) -> TagOrdering {
        if self.0.eq_ignore_ascii_case(&other.0) {
            return TagOrdering::Equal;
        }

        let (left_ts, right_ts) = (parse_timestamp(&self.0), parse_timestamp(&other.0));
        if let (Some(left), Some(right)) = (left_ts, right_ts) {
            return left.cmp(&right).into();
        }

        let (left_num, right_num) = (parse_numeric(&self.0), parse_numeric(&other.0));
        if let (Some(left), Some(right)) = (&left_num, &right_num) {
            return left.cmp(right).into();
        }

        match (left_ts, right_ts) {
            (Some(_), None) if right_num.is_some() => TagOrdering::Greater,
            (None, Some(_)) if left_num.is_some() => TagOrdering::Less,
            _ => TagOrdering::Incomparable,
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VersionTag {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for VersionTag {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<VersionTag> for String {
    fn from(tag: VersionTag) -> Self {
        tag.0
    }
}

/// Dotted version with up to four components and an optional pre-release
#[derive(Debug, PartialEq, Eq)]
struct NumericVersion {
    parts: [u64; 4],
    pre: Option<Prerelease>,
}

impl Ord for NumericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts).then_with(|| match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        })
    }
}

impl PartialOrd for NumericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_numeric(tag: &str) -> Option<NumericVersion> {
    let (core, pre) = match tag.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (tag, None),
    };

    let components: Vec<&str> = core.split('.').collect();
    if components.is_empty() || components.len() > 4 {
        return None;
    }
    // `20251110-1200` is a timestamp, not version 20251110 with a pre-release
    if pre.is_some() && components.len() < 2 {
        return None;
    }

    let mut parts = [0u64; 4];
    for (slot, component) in parts.iter_mut().zip(&components) {
        if component.is_empty() || !component.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        *slot = component.parse().ok()?;
    }

    let pre = match pre {
        Some(pre) => Some(Prerelease::new(pre).ok().filter(|p| !p.is_empty())?),
        None => None,
    };

    Some(NumericVersion { parts, pre })
}

fn parse_timestamp(tag: &str) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP_RE.captures(tag)?;
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    match (number(4), number(5)) {
        (Some(hour), Some(minute)) => date.and_hms_opt(hour, minute, 0),
        _ => date.and_hms_opt(0, 0, 0),
    }
}
