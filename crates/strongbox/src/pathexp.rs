//! Path expressions
//!
//! A path expression addresses credentials in a six dimensional namespace:
//!
//! ```text
//! /org/project/environment/service/identity/instance
//! ```
//!
//! Org and project are always concrete names. The remaining four segments are
//! either a name or the wildcard `*`. Segment order is fixed; matching is done
//! segment by segment, never on the joined text.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// The wildcard segment
pub const WILDCARD: &str = "*";

/// Path separator
pub const SEPARATOR: char = '/';

/// Longest name accepted in a single segment
pub const MAX_SEGMENT_LEN: usize = 64;

const SEGMENT_COUNT: usize = 6;

/// One addressing dimension, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Org,
    Project,
    Environment,
    Service,
    Identity,
    Instance,
}

impl Dimension {
    pub const ALL: [Dimension; SEGMENT_COUNT] = [
        Dimension::Org,
        Dimension::Project,
        Dimension::Environment,
        Dimension::Service,
        Dimension::Identity,
        Dimension::Instance,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Org => "org",
            Dimension::Project => "project",
            Dimension::Environment => "environment",
            Dimension::Service => "service",
            Dimension::Identity => "identity",
            Dimension::Instance => "instance",
        }
    }

    /// Org and project must always be named
    pub fn allows_wildcard(&self) -> bool {
        !matches!(self, Dimension::Org | Dimension::Project)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single path segment
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Segment {
    Name(String),
    #[default]
    Wildcard,
}

impl Segment {
    /// Parse segment text for the given dimension
    pub fn parse(dimension: Dimension, text: &str) -> Result<Self> {
        if text == WILDCARD {
            if !dimension.allows_wildcard() {
                return Err(Error::parse(format!("{} cannot be a wildcard", dimension)));
            }
            return Ok(Segment::Wildcard);
        }
        validate_name(dimension, text)?;
        Ok(Segment::Name(text.to_string()))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Segment::Name(name) => name,
            Segment::Wildcard => WILDCARD,
        }
    }

    /// True if `pattern` is the wildcard or structurally equal to this segment
    pub fn matches(&self, pattern: &Segment) -> bool {
        pattern.is_wildcard() || pattern == self
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a segment name: ASCII alphanumerics and hyphens, starting alphanumeric
fn validate_name(dimension: Dimension, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::parse(format!("{} segment is empty", dimension)));
    }
    if name.len() > MAX_SEGMENT_LEN {
        return Err(Error::parse(format!(
            "{} segment longer than {} characters",
            dimension, MAX_SEGMENT_LEN
        )));
    }
    if name.starts_with('-') {
        return Err(Error::parse(format!(
            "{} segment {:?} must start with a letter or digit",
            dimension, name
        )));
    }
    if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
        return Err(Error::parse(format!(
            "invalid character {:?} in {} segment {:?}",
            c, dimension, name
        )));
    }
    Ok(())
}

/// Split path text into raw segments, rejecting empty ones
fn split(text: &str) -> Result<Vec<&str>> {
    if text.is_empty() {
        return Err(Error::parse("path expression is empty"));
    }
    let parts: Vec<&str> = text.split(SEPARATOR).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::parse(format!("path expression {:?} has an empty segment", text)));
    }
    Ok(parts)
}

fn segments_match(value: &[Segment; SEGMENT_COUNT], pattern: &[Segment; SEGMENT_COUNT]) -> bool {
    value.iter().zip(pattern.iter()).all(|(v, p)| v.matches(p))
}

fn write_segments(f: &mut fmt::Formatter<'_>, segments: &[Segment; SEGMENT_COUNT]) -> fmt::Result {
    for segment in segments {
        write!(f, "{}{}", SEPARATOR, segment)?;
    }
    Ok(())
}

/// A fully specified path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExp {
    segments: [Segment; SEGMENT_COUNT],
}

impl PathExp {
    /// Parse canonical text: a leading `/` and exactly six segments
    pub fn parse_full(text: &str) -> Result<Self> {
        let rest = text.strip_prefix(SEPARATOR).ok_or_else(|| {
            Error::parse(format!("path expression {:?} must start with '{}'", text, SEPARATOR))
        })?;
        let parts = split(rest)?;
        if parts.len() != SEGMENT_COUNT {
            return Err(Error::parse(format!(
                "path expression {:?} has {} segments, expected {}",
                text,
                parts.len(),
                SEGMENT_COUNT
            )));
        }
        let segments = parse_segments(&parts)?;
        Ok(Self { segments })
    }

    /// Parse a path relative to a known org and project
    ///
    /// `text` holds one to four segments starting at the environment; missing
    /// trailing segments are wildcards.
    pub fn parse_relative(org: &str, project: &str, text: &str) -> Result<Self> {
        let parts = split(text)?;
        let max = SEGMENT_COUNT - Dimension::Environment.index();
        if parts.len() > max {
            return Err(Error::parse(format!(
                "relative path {:?} has {} segments, at most {} allowed",
                text,
                parts.len(),
                max
            )));
        }
        let mut all = vec![org, project];
        all.extend(parts);
        all.resize(SEGMENT_COUNT, WILDCARD);
        let segments = parse_segments(&all)?;
        Ok(Self { segments })
    }

    /// One path expression per combination of the supplied alternatives
    ///
    /// Every alternative set must hold at least one value; use `*` to mean
    /// "any". Duplicate alternatives are collapsed.
    pub fn construct(
        org: &str,
        project: &str,
        environments: &[String],
        services: &[String],
        identities: &[String],
        instances: &[String],
    ) -> Result<Vec<Self>> {
        if org.trim().is_empty() {
            return Err(Error::validation("org is required"));
        }
        if project.trim().is_empty() {
            return Err(Error::validation("project is required"));
        }
        let org = Segment::parse(Dimension::Org, org)?;
        let project = Segment::parse(Dimension::Project, project)?;

        let sets = [
            (Dimension::Environment, environments),
            (Dimension::Service, services),
            (Dimension::Identity, identities),
            (Dimension::Instance, instances),
        ];

        let mut alternatives: Vec<Vec<Segment>> = Vec::with_capacity(sets.len());
        for (dimension, values) in sets {
            if values.is_empty() {
                return Err(Error::validation(format!(
                    "at least one {} is required",
                    dimension
                )));
            }
            let mut seen = HashSet::new();
            let mut parsed = Vec::with_capacity(values.len());
            for value in values {
                let segment = Segment::parse(dimension, value)?;
                if seen.insert(segment.clone()) {
                    parsed.push(segment);
                }
            }
            alternatives.push(parsed);
        }

        let mut out = Vec::new();
        for env in &alternatives[0] {
            for service in &alternatives[1] {
                for identity in &alternatives[2] {
                    for instance in &alternatives[3] {
                        out.push(Self {
                            segments: [
                                org.clone(),
                                project.clone(),
                                env.clone(),
                                service.clone(),
                                identity.clone(),
                                instance.clone(),
                            ],
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn org(&self) -> &str {
        self.segments[Dimension::Org.index()].as_str()
    }

    pub fn project(&self) -> &str {
        self.segments[Dimension::Project.index()].as_str()
    }

    pub fn segment(&self, dimension: Dimension) -> &Segment {
        &self.segments[dimension.index()]
    }

    /// True if every segment of `pattern` is a wildcard or equals ours
    pub fn matches(&self, pattern: &PathExp) -> bool {
        segments_match(&self.segments, &pattern.segments)
    }
}

/// Parse leading dimensions from `parts`; the rest stay wildcards
fn parse_segments(parts: &[&str]) -> Result<[Segment; SEGMENT_COUNT]> {
    let mut segments: [Segment; SEGMENT_COUNT] = Default::default();
    for (dimension, part) in Dimension::ALL.iter().zip(parts) {
        segments[dimension.index()] = Segment::parse(*dimension, part)?;
    }
    Ok(segments)
}

impl fmt::Display for PathExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.segments)
    }
}

impl FromStr for PathExp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_full(s)
    }
}

impl Serialize for PathExp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PathExp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_full(&s).map_err(serde::de::Error::custom)
    }
}

/// A path prefix; omitted trailing segments are wildcards
///
/// The project may be a wildcard here only because it was omitted. Turning
/// the prefix into an addressable [`PathExp`] requires a named project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialPathExp {
    segments: [Segment; SEGMENT_COUNT],
}

impl PartialPathExp {
    /// Parse one to six segments, with or without a leading `/`
    pub fn parse(text: &str) -> Result<Self> {
        let rest = text.strip_prefix(SEPARATOR).unwrap_or(text);
        let parts = split(rest)?;
        if parts.len() > SEGMENT_COUNT {
            return Err(Error::parse(format!(
                "path expression {:?} has {} segments, at most {} allowed",
                text,
                parts.len(),
                SEGMENT_COUNT
            )));
        }
        let segments = parse_segments(&parts)?;
        Ok(Self { segments })
    }

    pub fn org(&self) -> &str {
        self.segments[Dimension::Org.index()].as_str()
    }

    pub fn segment(&self, dimension: Dimension) -> &Segment {
        &self.segments[dimension.index()]
    }

    /// Require a named project and produce a full path expression
    pub fn complete(self) -> Result<PathExp> {
        if self.segment(Dimension::Project).is_wildcard() {
            return Err(Error::validation(format!(
                "path {} does not name a project",
                self
            )));
        }
        Ok(PathExp {
            segments: self.segments,
        })
    }

    /// True if `full` falls under this prefix
    pub fn matches(&self, full: &PathExp) -> bool {
        segments_match(&full.segments, &self.segments)
    }
}

impl fmt::Display for PartialPathExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.segments)
    }
}

impl FromStr for PartialPathExp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_full() {
        let pe = PathExp::parse_full("/acme/api/production/web/*/1").unwrap();
        assert_eq!(pe.org(), "acme");
        assert_eq!(pe.project(), "api");
        assert_eq!(pe.segment(Dimension::Environment), &Segment::Name("production".into()));
        assert!(pe.segment(Dimension::Identity).is_wildcard());
        assert_eq!(pe.to_string(), "/acme/api/production/web/*/1");
    }

    #[test]
    fn test_parse_full_rejects() {
        for bad in [
            "acme/api/production/web/*/1",
            "/acme/api/production/web/*",
            "/acme/api/production/web/*/1/extra",
            "/acme//production/web/*/1",
            "/*/api/production/web/*/1",
            "/acme/*/production/web/*/1",
            "/acme/api/prod_1/web/*/1",
            "/acme/api/-prod/web/*/1",
            "/",
        ] {
            assert!(
                matches!(PathExp::parse_full(bad), Err(Error::Parse(_))),
                "expected parse error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_segment_length_limit() {
        let long = "a".repeat(MAX_SEGMENT_LEN + 1);
        assert!(Segment::parse(Dimension::Service, &long).is_err());
        assert!(Segment::parse(Dimension::Service, &long[1..]).is_ok());
    }

    #[test]
    fn test_partial_defaults_to_wildcards() {
        let short = PartialPathExp::parse("org/proj/env").unwrap();
        let long = PartialPathExp::parse("org/proj/env/*/*/*").unwrap();
        assert_eq!(short, long);
        assert_eq!(PartialPathExp::parse("/org/proj/env").unwrap(), short);
        assert_eq!(short.to_string(), "/org/proj/env/*/*/*");
    }

    #[test]
    fn test_partial_org_only() {
        let partial = PartialPathExp::parse("acme").unwrap();
        assert_eq!(partial.org(), "acme");
        assert!(partial.segment(Dimension::Project).is_wildcard());
        assert!(matches!(partial.complete(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_partial_rejects() {
        assert!(matches!(PartialPathExp::parse(""), Err(Error::Parse(_))));
        assert!(matches!(PartialPathExp::parse("acme/"), Err(Error::Parse(_))));
        assert!(matches!(PartialPathExp::parse("acme/*"), Err(Error::Parse(_))));
        assert!(matches!(PartialPathExp::parse("a/b/c/d/e/f/g"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_partial_complete() {
        let pe = PartialPathExp::parse("acme/api/dev").unwrap().complete().unwrap();
        assert_eq!(pe, PathExp::parse_full("/acme/api/dev/*/*/*").unwrap());
    }

    #[test]
    fn test_parse_relative() {
        let pe = PathExp::parse_relative("acme", "api", "myenv/myservice").unwrap();
        assert_eq!(pe.to_string(), "/acme/api/myenv/myservice/*/*");
        assert!(PathExp::parse_relative("acme", "api", "a/b/c/d/e").is_err());
    }

    #[test]
    fn test_construct_combinations() {
        let pes = PathExp::construct(
            "acme",
            "api",
            &strings(&["dev", "staging"]),
            &strings(&["web", "worker", "web"]),
            &strings(&["*"]),
            &strings(&["*"]),
        )
        .unwrap();
        let texts: Vec<String> = pes.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            texts,
            vec![
                "/acme/api/dev/web/*/*",
                "/acme/api/dev/worker/*/*",
                "/acme/api/staging/web/*/*",
                "/acme/api/staging/worker/*/*",
            ]
        );
    }

    #[test]
    fn test_construct_requires_values() {
        let one = strings(&["*"]);
        assert!(matches!(
            PathExp::construct("", "api", &one, &one, &one, &one),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            PathExp::construct("acme", " ", &one, &one, &one, &one),
            Err(Error::Validation(_))
        ));
        let err = PathExp::construct("acme", "api", &[], &one, &one, &one).unwrap_err();
        assert_eq!(err.to_string(), "at least one environment is required");
        assert!(matches!(
            PathExp::construct("acme", "api", &one, &strings(&["bad name"]), &one, &one),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_matching() {
        let full = PathExp::parse_full("/acme/api/dev/web/u-alice/1").unwrap();
        let any_env = PathExp::parse_full("/acme/api/*/web/*/*").unwrap();
        let other = PathExp::parse_full("/acme/api/prod/web/*/*").unwrap();
        assert!(full.matches(&any_env));
        assert!(!full.matches(&other));

        // Segment-wise, not substring-wise
        let prefix = PathExp::parse_full("/acme/api/de/web/*/*").unwrap();
        assert!(!full.matches(&prefix));

        let partial = PartialPathExp::parse("acme/api").unwrap();
        assert!(partial.matches(&full));
        assert!(!PartialPathExp::parse("acme/web").unwrap().matches(&full));
    }

    #[test]
    fn test_serde_as_text() {
        let pe = PathExp::parse_full("/acme/api/dev/*/*/*").unwrap();
        let json = serde_json::to_string(&pe).unwrap();
        assert_eq!(json, "\"/acme/api/dev/*/*/*\"");
        let back: PathExp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pe);
        assert!(serde_json::from_str::<PathExp>("\"/acme\"").is_err());
    }

    fn name() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9-]{0,12}"
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![Just(WILDCARD.to_string()), name()]
    }

    fn full_text() -> impl Strategy<Value = String> {
        (name(), name(), segment(), segment(), segment(), segment())
            .prop_map(|(a, b, c, d, e, f)| format!("/{}/{}/{}/{}/{}/{}", a, b, c, d, e, f))
    }

    proptest! {
        #[test]
        fn prop_full_round_trip(text in full_text()) {
            let pe = PathExp::parse_full(&text).unwrap();
            prop_assert_eq!(pe.to_string(), text);
        }

        #[test]
        fn prop_matching_ignores_check_order(a in full_text(), b in full_text()) {
            let value = PathExp::parse_full(&a).unwrap();
            let pattern = PathExp::parse_full(&b).unwrap();
            let reversed = Dimension::ALL
                .iter()
                .rev()
                .all(|d| value.segment(*d).matches(pattern.segment(*d)));
            prop_assert_eq!(value.matches(&pattern), reversed);
        }

        #[test]
        fn prop_value_matches_itself(a in full_text()) {
            let value = PathExp::parse_full(&a).unwrap();
            prop_assert!(value.matches(&value));
        }
    }
}
