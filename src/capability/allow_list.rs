//! Allow-list of compute-capability pairs accepted by the accelerated backend.
//!
//! The table is configuration. The default mirrors the generations the
//! flash-attention v2 kernels were built for, and deployments can replace it
//! through `FLASHGATE_ALLOWED_ARCHS` (see [`crate::gate::GateConfig`]).
//!
//! Textual form, comma separated:
//! - `8.6`  exact pair
//! - `8.x`  any minor version of major 8 (`8.*` is accepted too)
//! - `8.6+` major 8 with minor 6 or newer

use std::fmt;
use std::str::FromStr;

use super::HardwareProfile;
use crate::error::GateError;

/// Constraint on the minor version for one major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinorConstraint {
    Exact(u32),
    AtLeast(u32),
}

impl MinorConstraint {
    fn matches(&self, minor: u32) -> bool {
        match *self {
            MinorConstraint::Exact(n) => minor == n,
            MinorConstraint::AtLeast(n) => minor >= n,
        }
    }
}

/// One accepted architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchRule {
    pub major: u32,
    pub minor: MinorConstraint,
}

impl ArchRule {
    pub const fn exact(major: u32, minor: u32) -> Self {
        ArchRule {
            major,
            minor: MinorConstraint::Exact(minor),
        }
    }

    pub const fn at_least(major: u32, minor: u32) -> Self {
        ArchRule {
            major,
            minor: MinorConstraint::AtLeast(minor),
        }
    }

    pub fn matches(&self, profile: &HardwareProfile) -> bool {
        profile.major == self.major && self.minor.matches(profile.minor)
    }
}

impl fmt::Display for ArchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            MinorConstraint::Exact(n) => write!(f, "{}.{}", self.major, n),
            MinorConstraint::AtLeast(0) => write!(f, "{}.x", self.major),
            MinorConstraint::AtLeast(n) => write!(f, "{}.{}+", self.major, n),
        }
    }
}

impl FromStr for ArchRule {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let invalid = || {
            GateError::InvalidConfiguration(format!(
                "invalid architecture entry '{}': expected MAJOR.MINOR, MAJOR.x or MAJOR.MINOR+",
                entry
            ))
        };

        let (major, minor) = entry.split_once('.').ok_or_else(invalid)?;
        let major: u32 = major.trim().parse().map_err(|_| invalid())?;
        let minor = minor.trim();

        let constraint = if minor == "x" || minor == "*" {
            MinorConstraint::AtLeast(0)
        } else if let Some(base) = minor.strip_suffix('+') {
            MinorConstraint::AtLeast(base.parse().map_err(|_| invalid())?)
        } else {
            MinorConstraint::Exact(minor.parse().map_err(|_| invalid())?)
        };

        Ok(ArchRule {
            major,
            minor: constraint,
        })
    }
}

/// Ordered table of accepted architectures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    rules: Vec<ArchRule>,
}

impl Default for AllowList {
    /// `7.5`, `8.x`, `9.0`
    fn default() -> Self {
        AllowList::new(vec![
            ArchRule::exact(7, 5),
            ArchRule::at_least(8, 0),
            ArchRule::exact(9, 0),
        ])
    }
}

impl AllowList {
    pub fn new(rules: Vec<ArchRule>) -> Self {
        AllowList { rules }
    }

    /// Ampere and Hopper only (`8.x`, `9.0`), the set flash-attention v2
    /// itself compiles kernels for.
    pub fn ampere_and_newer() -> Self {
        AllowList::new(vec![ArchRule::at_least(8, 0), ArchRule::exact(9, 0)])
    }

    pub fn rules(&self) -> &[ArchRule] {
        &self.rules
    }

    pub fn is_supported(&self, profile: &HardwareProfile) -> bool {
        self.rules.iter().any(|rule| rule.matches(profile))
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}

impl FromStr for AllowList {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rules = s
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(ArchRule::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        if rules.is_empty() {
            return Err(GateError::InvalidConfiguration(
                "architecture allow-list is empty".to_string(),
            ));
        }

        Ok(AllowList::new(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_table() {
        let list = AllowList::default();
        assert!(list.is_supported(&HardwareProfile::new(7, 5)));
        assert!(list.is_supported(&HardwareProfile::new(8, 0)));
        assert!(list.is_supported(&HardwareProfile::new(8, 6)));
        assert!(list.is_supported(&HardwareProfile::new(8, 9)));
        assert!(list.is_supported(&HardwareProfile::new(9, 0)));

        assert!(!list.is_supported(&HardwareProfile::new(7, 0)));
        assert!(!list.is_supported(&HardwareProfile::new(6, 1)));
        assert!(!list.is_supported(&HardwareProfile::new(9, 1)));
        assert!(!list.is_supported(&HardwareProfile::new(10, 0)));
    }

    #[test]
    fn test_ampere_and_newer_drops_turing() {
        let list = AllowList::ampere_and_newer();
        assert!(!list.is_supported(&HardwareProfile::new(7, 5)));
        assert!(list.is_supported(&HardwareProfile::new(8, 6)));
    }

    #[test]
    fn test_display_parses_back() {
        let list = AllowList::default();
        assert_eq!(list.to_string(), "7.5,8.x,9.0");
        assert_eq!("7.5,8.x,9.0".parse::<AllowList>().unwrap(), list);
    }

    #[test]
    fn test_parse_variants() {
        let list: AllowList = " 8.6+ , 9.* ,10.0".parse().unwrap();
        assert_eq!(
            list.rules(),
            &[
                ArchRule::at_least(8, 6),
                ArchRule::at_least(9, 0),
                ArchRule::exact(10, 0),
            ]
        );
        assert!(!list.is_supported(&HardwareProfile::new(8, 0)));
        assert!(list.is_supported(&HardwareProfile::new(8, 9)));
        assert!(list.is_supported(&HardwareProfile::new(9, 4)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<AllowList>().is_err());
        assert!(" , ".parse::<AllowList>().is_err());
        assert!("8".parse::<AllowList>().is_err());
        assert!("eight.0".parse::<AllowList>().is_err());
        assert!("8.y".parse::<AllowList>().is_err());
        assert!("8.0,9.a+".parse::<AllowList>().is_err());
    }

    #[test]
    fn test_parse_error_is_configuration() {
        let err = "sm86".parse::<AllowList>().unwrap_err();
        assert!(matches!(err, GateError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("sm86"));
    }

    proptest! {
        #[test]
        fn test_major_eight_always_supported(minor in 0u32..64) {
            prop_assert!(AllowList::default().is_supported(&HardwareProfile::new(8, minor)));
        }

        #[test]
        fn test_unknown_majors_rejected(major in 0u32..32, minor in 0u32..16) {
            prop_assume!(major != 7 && major != 8 && major != 9);
            prop_assert!(!AllowList::default().is_supported(&HardwareProfile::new(major, minor)));
        }
    }
}
