//! Four-component dotted-decimal versions and the five import match rules.
//!
//! Deliberately not the `semver` crate: descriptors use a fixed four-slot
//! numeric tuple with no prerelease/build-metadata grammar, compared
//! lexicographically component by component (see the design notes on
//! version strings).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed `a.b.c.d` version, missing trailing components defaulting to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version([u32; 4]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("version has more than four components: {0:?}")]
    TooManyComponents(String),
    #[error("non-numeric version component in {0:?}")]
    NonNumeric(String),
}

impl Version {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Version([a, b, c, d])
    }

    pub fn components(&self) -> [u32; 4] {
        self.0
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionParseError::TooManyComponents(s.to_string()));
        }
        let mut out = [0u32; 4];
        for (i, p) in parts.iter().enumerate() {
            out[i] = p
                .parse::<u32>()
                .map_err(|_| VersionParseError::NonNumeric(s.to_string()))?;
        }
        Ok(Version(out))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// The five-variant match rule a descriptor's `import` element can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    None,
    Perfect,
    Equivalent,
    Compatible,
    GreaterOrEqual,
}

impl MatchRule {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(MatchRule::None),
            "perfect" => Some(MatchRule::Perfect),
            "equivalent" => Some(MatchRule::Equivalent),
            "compatible" => Some(MatchRule::Compatible),
            "greaterOrEqual" => Some(MatchRule::GreaterOrEqual),
            _ => None,
        }
    }

    /// `candidate` is the version actually present; `required` is the
    /// version named in the import constraint.
    pub fn matches(&self, candidate: Version, required: Version) -> bool {
        let c = candidate.0;
        let r = required.0;
        match self {
            MatchRule::None => true,
            MatchRule::Perfect => c == r,
            MatchRule::Equivalent => c[0] == r[0] && c[1] == r[1] && c >= r,
            MatchRule::Compatible => c[0] == r[0] && c >= r,
            MatchRule::GreaterOrEqual => c >= r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_forms_with_zero_padding() {
        assert_eq!("1".parse::<Version>().unwrap(), Version::new(1, 0, 0, 0));
        assert_eq!(
            "1.2.3".parse::<Version>().unwrap(),
            Version::new(1, 2, 3, 0)
        );
        assert_eq!(
            "1.2.3.4".parse::<Version>().unwrap(),
            Version::new(1, 2, 3, 4)
        );
    }

    #[test]
    fn rejects_too_many_components() {
        assert!(matches!(
            "1.2.3.4.5".parse::<Version>(),
            Err(VersionParseError::TooManyComponents(_))
        ));
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(matches!(
            "1.x.3".parse::<Version>(),
            Err(VersionParseError::NonNumeric(_))
        ));
    }

    #[test]
    fn lexicographic_ordering() {
        assert!(Version::new(1, 0, 1, 0) > Version::new(1, 0, 0, 9));
        assert!(Version::new(1, 1, 0, 0) > Version::new(1, 0, 9, 9));
    }

    #[test]
    fn match_rules() {
        let req = Version::new(1, 2, 0, 0);
        assert!(MatchRule::Perfect.matches(Version::new(1, 2, 0, 0), req));
        assert!(!MatchRule::Perfect.matches(Version::new(1, 2, 0, 1), req));

        assert!(MatchRule::Equivalent.matches(Version::new(1, 2, 5, 0), req));
        assert!(!MatchRule::Equivalent.matches(Version::new(1, 3, 0, 0), req));

        assert!(MatchRule::Compatible.matches(Version::new(1, 9, 0, 0), req));
        assert!(!MatchRule::Compatible.matches(Version::new(2, 0, 0, 0), req));

        assert!(MatchRule::GreaterOrEqual.matches(Version::new(5, 0, 0, 0), req));
        assert!(!MatchRule::GreaterOrEqual.matches(Version::new(1, 1, 9, 9), req));

        assert!(MatchRule::None.matches(Version::new(0, 0, 0, 0), req));
    }

    #[test]
    fn parse_match_rule_rejects_unknown() {
        assert_eq!(MatchRule::parse("bogus"), None);
        assert_eq!(MatchRule::parse("perfect"), Some(MatchRule::Perfect));
    }
}
