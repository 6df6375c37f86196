//! Version ranges as intervals over semantic versions
//!
//! A [`VersionRange`] is a single interval `lower..upper` where each end is a
//! [`Bound`]. Every Cargo-style requirement (`^1.2`, `~1.2.3`, `>=1.0, <2.0`,
//! `1.*`) is an interval, and the intersection of two intervals is again an
//! interval, so conflicts show up as an empty range instead of a failed search.

use semver::{Comparator, Op, Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a version range
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("Invalid version range '{input}': {source}")]
    Invalid {
        input: String,
        #[source]
        source: semver::Error,
    },

    #[error("Unsupported operator in version range '{0}'")]
    UnsupportedOperator(String),
}

/// An interval of acceptable versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    lower: Bound<Version>,
    upper: Bound<Version>,
}

impl VersionRange {
    /// The unconstrained range, matching every version
    pub fn any() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Range matching exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            lower: Bound::Included(version.clone()),
            upper: Bound::Included(version),
        }
    }

    /// Half-open range `[lower, upper)`
    pub fn between(lower: Version, upper: Version) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Excluded(upper),
        }
    }

    /// Range `>= version`
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Bound::Included(version),
            upper: Bound::Unbounded,
        }
    }

    /// Range `< version`
    pub fn below(version: Version) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(version),
        }
    }

    /// Build a range from raw bounds
    pub fn from_bounds(lower: Bound<Version>, upper: Bound<Version>) -> Self {
        Self { lower, upper }
    }

    pub fn lower(&self) -> &Bound<Version> {
        &self.lower
    }

    pub fn upper(&self) -> &Bound<Version> {
        &self.upper
    }

    /// Parse a Cargo-style requirement string
    ///
    /// `*` and the empty string are unconstrained. A bare version such as
    /// `1.2` is a caret requirement, matching `semver::VersionReq`.
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let req = VersionReq::parse(trimmed).map_err(|source| RangeError::Invalid {
            input: trimmed.to_string(),
            source,
        })?;

        Self::from_req(&req)
    }

    /// Convert a parsed requirement into a single interval
    pub fn from_req(req: &VersionReq) -> Result<Self, RangeError> {
        let mut range = Self::any();
        for comparator in &req.comparators {
            range = range.intersect(&comparator_range(comparator)?);
        }
        Ok(range)
    }

    /// Check whether a version lies inside this range
    pub fn contains(&self, version: &Version) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => version >= l,
            Bound::Excluded(l) => version > l,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => version <= u,
            Bound::Excluded(u) => version < u,
        };
        above_lower && below_upper
    }

    /// True when no version can satisfy this range
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        }
    }

    /// True when this range places no constraint at all
    pub fn is_any(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    /// Intersection of two ranges; may be empty
    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        VersionRange {
            lower: tighter_lower(&self.lower, &other.lower),
            upper: tighter_upper(&self.upper, &other.upper),
        }
    }

    /// Intersection of any number of ranges; an empty input is unconstrained
    pub fn intersect_all<'a, I>(ranges: I) -> VersionRange
    where
        I: IntoIterator<Item = &'a VersionRange>,
    {
        ranges
            .into_iter()
            .fold(VersionRange::any(), |acc, range| acc.intersect(range))
    }

    /// True when the two ranges share no version
    pub fn is_disjoint(&self, other: &VersionRange) -> bool {
        self.intersect(other).is_empty()
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

fn tighter_lower(a: &Bound<Version>, b: &Bound<Version>) -> Bound<Version> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y).clone()),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y).clone()),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if e >= i {
                Bound::Excluded(e.clone())
            } else {
                Bound::Included(i.clone())
            }
        }
    }
}

fn tighter_upper(a: &Bound<Version>, b: &Bound<Version>) -> Bound<Version> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y).clone()),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y).clone()),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if e <= i {
                Bound::Excluded(e.clone())
            } else {
                Bound::Included(i.clone())
            }
        }
    }
}

/// `[floor, upper)`, or `>= floor` when the bump past the last component overflowed
fn up_to(floor: Version, upper: Option<Version>) -> VersionRange {
    match upper {
        Some(upper) => VersionRange::between(floor, upper),
        None => VersionRange::at_least(floor),
    }
}

/// `< upper`, or every version when there is nothing above
fn below_or_any(upper: Option<Version>) -> VersionRange {
    upper.map_or_else(VersionRange::any, VersionRange::below)
}

/// `>= next`, or `> last` when `next` does not exist
fn above(next: Option<Version>, last: Version) -> VersionRange {
    match next {
        Some(next) => VersionRange::at_least(next),
        None => VersionRange::from_bounds(Bound::Excluded(last), Bound::Unbounded),
    }
}

/// Interval covered by a single semver comparator
fn comparator_range(c: &Comparator) -> Result<VersionRange, RangeError> {
    let major = c.major;
    let mut floor = Version::new(major, c.minor.unwrap_or(0), c.patch.unwrap_or(0));
    floor.pre = c.pre.clone();

    // None when the component is already u64::MAX
    let next_major = major.checked_add(1).map(|m| Version::new(m, 0, 0));
    let next_minor = |minor: u64| minor.checked_add(1).map(|m| Version::new(major, m, 0));
    let last_of_major = Version::new(major, u64::MAX, u64::MAX);
    let last_of_minor = |minor: u64| Version::new(major, minor, u64::MAX);

    let range = match c.op {
        Op::Exact => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::exact(floor),
            (Some(minor), None) => up_to(floor, next_minor(minor)),
            (None, _) => up_to(floor, next_major),
        },
        Op::Greater => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::from_bounds(Bound::Excluded(floor), Bound::Unbounded),
            (Some(minor), None) => above(next_minor(minor), last_of_minor(minor)),
            (None, _) => above(next_major, last_of_major),
        },
        Op::GreaterEq => VersionRange::at_least(floor),
        Op::Less => VersionRange::below(floor),
        Op::LessEq => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::from_bounds(Bound::Unbounded, Bound::Included(floor)),
            (Some(minor), None) => below_or_any(next_minor(minor)),
            (None, _) => below_or_any(next_major),
        },
        Op::Tilde => match c.minor {
            Some(minor) => up_to(floor, next_minor(minor)),
            None => up_to(floor, next_major),
        },
        Op::Caret => match (major, c.minor, c.patch) {
            (0, Some(0), Some(patch)) => up_to(floor, patch.checked_add(1).map(|p| Version::new(0, 0, p))),
            (0, Some(minor), _) => up_to(floor, next_minor(minor)),
            _ => up_to(floor, next_major),
        },
        Op::Wildcard => match c.minor {
            Some(minor) => up_to(floor, next_minor(minor)),
            None => up_to(floor, next_major),
        },
        _ => return Err(RangeError::UnsupportedOperator(c.to_string())),
    };

    Ok(range)
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "*");
        }
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        if let (Bound::Included(l), Bound::Included(u)) = (&self.lower, &self.upper) {
            if l == u {
                return write!(f, "={}", l);
            }
        }

        let mut parts = Vec::with_capacity(2);
        match &self.lower {
            Bound::Included(l) => parts.push(format!(">={}", l)),
            Bound::Excluded(l) => parts.push(format!(">{}", l)),
            Bound::Unbounded => {}
        }
        match &self.upper {
            Bound::Included(u) => parts.push(format!("<={}", u)),
            Bound::Excluded(u) => parts.push(format!("<{}", u)),
            Bound::Unbounded => {}
        }
        write!(f, "{}", parts.join(", "))
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[rstest]
    #[case("*", "0.0.1", true)]
    #[case("*", "99.0.0", true)]
    #[case(">=1.0, <2.0", "1.5.0", true)]
    #[case(">=1.0, <2.0", "2.0.0", false)]
    #[case(">=1.0, <2.0", "0.9.9", false)]
    #[case("^1.2.3", "1.9.0", true)]
    #[case("^1.2.3", "2.0.0", false)]
    #[case("^0.2.3", "0.2.9", true)]
    #[case("^0.2.3", "0.3.0", false)]
    #[case("^0.0.3", "0.0.4", false)]
    #[case("~1.2.3", "1.2.9", true)]
    #[case("~1.2.3", "1.3.0", false)]
    #[case("=1.2.3", "1.2.3", true)]
    #[case("=1.2.3", "1.2.4", false)]
    #[case("=1.2", "1.2.7", true)]
    #[case("1.*", "1.8.0", true)]
    #[case("1.*", "2.0.0", false)]
    #[case(">1.2", "1.2.9", false)]
    #[case(">1.2", "1.3.0", true)]
    #[case("<=1.2", "1.2.9", true)]
    #[case("<=1.2", "1.3.0", false)]
    #[case("1.4", "1.9.0", true)]
    #[case("1.4", "1.3.9", false)]
    fn test_parse_and_contains(#[case] req: &str, #[case] version: &str, #[case] expected: bool) {
        assert_eq!(range(req).contains(&v(version)), expected, "{} vs {}", req, version);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(VersionRange::parse(">=banana").is_err());
    }

    #[test]
    fn test_maximal_components_do_not_overflow() {
        let max = u64::MAX;
        let top = Version::new(max, max, max);

        assert!(range(&format!("^{}.0.0", max)).contains(&top));
        assert!(range(&format!("~1.{}.0", max)).contains(&Version::new(1, max, 7)));
        assert!(range(&format!("^0.0.{}", max)).contains(&Version::new(0, 0, max)));
        assert!(range(&format!("<={}", max)).is_any());
        assert!(!range(&format!(">{}", max)).contains(&top));
    }

    #[test]
    fn test_intersect_all_empty_is_any() {
        let ranges: Vec<VersionRange> = Vec::new();
        assert!(VersionRange::intersect_all(&ranges).is_any());
    }

    #[test]
    fn test_conflicting_intersection_is_empty() {
        let a = range(">=2.0");
        let b = range(">=1.0, <2.0");
        let both = a.intersect(&b);
        assert!(both.is_empty());
        assert!(a.is_disjoint(&b));
        assert_eq!(both.to_string(), "<empty>");
    }

    #[test]
    fn test_touching_bounds() {
        let upto = VersionRange::from_bounds(Bound::Unbounded, Bound::Included(v("1.0.0")));
        let from = range(">=1.0.0");
        let both = upto.intersect(&from);
        assert!(!both.is_empty());
        assert_eq!(both, VersionRange::exact(v("1.0.0")));

        let excl = range(">1.0.0");
        assert!(upto.intersect(&excl).is_empty());
    }

    #[test]
    fn test_display_roundtrip() {
        for req in [">=1.0.0, <2.0.0", "=1.2.3", ">1.0.0", "<3.0.0", "*"] {
            let parsed = range(req);
            assert_eq!(parsed.to_string(), req);
            assert_eq!(range(&parsed.to_string()), parsed);
        }
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            range: VersionRange,
        }

        let holder: Holder = toml::from_str(r#"range = "^1.2""#).unwrap();
        assert_eq!(holder.range.to_string(), ">=1.2.0, <2.0.0");
    }

    fn arb_version() -> impl Strategy<Value = Version> {
        (0u64..4, 0u64..4, 0u64..4).prop_map(|(a, b, c)| Version::new(a, b, c))
    }

    fn arb_range() -> impl Strategy<Value = VersionRange> {
        prop_oneof![
            Just(VersionRange::any()),
            arb_version().prop_map(VersionRange::exact),
            arb_version().prop_map(VersionRange::at_least),
            arb_version().prop_map(VersionRange::below),
            (arb_version(), arb_version()).prop_map(|(a, b)| VersionRange::between(a, b)),
        ]
    }

    proptest! {
        #[test]
        fn intersection_is_conjunction(a in arb_range(), b in arb_range(), version in arb_version()) {
            let both = a.intersect(&b);
            prop_assert_eq!(both.contains(&version), a.contains(&version) && b.contains(&version));
        }

        #[test]
        fn empty_ranges_contain_nothing(a in arb_range(), b in arb_range(), version in arb_version()) {
            let both = a.intersect(&b);
            if both.is_empty() {
                prop_assert!(!both.contains(&version));
            }
        }
    }
}
