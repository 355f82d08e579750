//! Access-level registry.
//!
//! The remote API stores permissions as integer codes while configuration
//! uses names. The registry is a constructed, read-only table: build it
//! once and pass it (by reference or clone) to everything that needs it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Permission levels, ordered by the remote permission hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccessLevel {
    NoAccess,
    Minimal,
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    /// All levels, lowest first.
    pub const ALL: [AccessLevel; 7] = [
        Self::NoAccess,
        Self::Minimal,
        Self::Guest,
        Self::Reporter,
        Self::Developer,
        Self::Maintainer,
        Self::Owner,
    ];

    /// Integer code used by the remote API.
    pub const fn code(self) -> i64 {
        match self {
            Self::NoAccess => 0,
            Self::Minimal => 5,
            Self::Guest => 10,
            Self::Reporter => 20,
            Self::Developer => 30,
            Self::Maintainer => 40,
            Self::Owner => 50,
        }
    }

    /// Name used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoAccess => "no one",
            Self::Minimal => "minimal",
            Self::Guest => "guest",
            Self::Reporter => "reporter",
            Self::Developer => "developer",
            Self::Maintainer => "maintainer",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.name() == wanted)
            .ok_or_else(|| Error::UnknownAccessLevel {
                name: s.to_string(),
                accepted: Self::ALL.iter().map(|l| l.name().to_string()).collect(),
            })
    }
}

impl TryFrom<i64> for AccessLevel {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or(Error::UnrecognizedAccessCode { code })
    }
}

impl TryFrom<String> for AccessLevel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AccessLevel> for String {
    fn from(level: AccessLevel) -> Self {
        level.name().to_string()
    }
}

/// Bidirectional name <-> code table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLevelRegistry {
    by_name: BTreeMap<&'static str, i64>,
    by_code: BTreeMap<i64, &'static str>,
}

impl AccessLevelRegistry {
    /// The registry for the GitLab permission model.
    pub fn gitlab() -> Self {
        let mut by_name = BTreeMap::new();
        let mut by_code = BTreeMap::new();
        for level in AccessLevel::ALL {
            by_name.insert(level.name(), level.code());
            by_code.insert(level.code(), level.name());
        }
        Self { by_name, by_code }
    }

    /// Build a registry from explicit entries.
    ///
    /// Fails if a name or a code appears twice, since the mapping must stay
    /// a bijection.
    pub fn from_entries(entries: impl IntoIterator<Item = (&'static str, i64)>) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        let mut by_code = BTreeMap::new();
        for (name, code) in entries {
            if by_name.insert(name, code).is_some() {
                return Err(Error::validation(
                    "access_level",
                    format!("duplicate access level name {name:?}"),
                ));
            }
            if by_code.insert(code, name).is_some() {
                return Err(Error::validation(
                    "access_level",
                    format!("duplicate access level code {code}"),
                ));
            }
        }
        Ok(Self { by_name, by_code })
    }

    /// Translate a name to the remote code.
    pub fn name_to_code(&self, name: &str) -> Result<i64> {
        let wanted = name.trim().to_lowercase();
        self.by_name
            .get(wanted.as_str())
            .copied()
            .ok_or_else(|| self.unknown(name, &[]))
    }

    /// Translate a remote code to its name.
    ///
    /// An unknown code means the remote is newer or older than this table;
    /// callers should warn and continue.
    pub fn code_to_name(&self, code: i64) -> Result<&'static str> {
        self.by_code
            .get(&code)
            .copied()
            .ok_or(Error::UnrecognizedAccessCode { code })
    }

    /// Registered names, ordered by code.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_code.values().copied()
    }

    /// Names accepted by a resource that rejects some levels.
    pub fn accepted_names(&self, excluding: &[&str]) -> Vec<&'static str> {
        self.names().filter(|n| !excluding.contains(n)).collect()
    }

    /// Validate a desired name against the accepted subset.
    pub fn validate_name(&self, name: &str, excluding: &[&str]) -> Result<i64> {
        let code = self
            .name_to_code(name)
            .map_err(|_| self.unknown(name, excluding))?;
        let canonical = self.code_to_name(code)?;
        if excluding.contains(&canonical) {
            return Err(self.unknown(name, excluding));
        }
        Ok(code)
    }

    fn unknown(&self, name: &str, excluding: &[&str]) -> Error {
        Error::UnknownAccessLevel {
            name: name.to_string(),
            accepted: self
                .accepted_names(excluding)
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for AccessLevelRegistry {
    fn default() -> Self {
        Self::gitlab()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_names() {
        let registry = AccessLevelRegistry::gitlab();
        for name in registry.names() {
            let code = registry.name_to_code(name).unwrap();
            assert_eq!(registry.code_to_name(code).unwrap(), name);
        }
        assert_eq!(registry.names().count(), AccessLevel::ALL.len());
    }

    #[test]
    fn test_known_codes() {
        let registry = AccessLevelRegistry::gitlab();
        assert_eq!(registry.name_to_code("developer").unwrap(), 30);
        assert_eq!(registry.name_to_code("Maintainer").unwrap(), 40);
        assert_eq!(registry.code_to_name(10).unwrap(), "guest");
    }

    #[test]
    fn test_unknown_name_is_error() {
        let registry = AccessLevelRegistry::gitlab();
        assert!(matches!(
            registry.name_to_code("admin"),
            Err(Error::UnknownAccessLevel { .. })
        ));
    }

    #[test]
    fn test_unknown_code_is_warning() {
        let registry = AccessLevelRegistry::gitlab();
        let err = registry.code_to_name(60).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedAccessCode { code: 60 }));
        assert!(err.category().is_warning());
    }

    #[test]
    fn test_accepted_names_excluding_owner() {
        let registry = AccessLevelRegistry::gitlab();
        let accepted = registry.accepted_names(&["owner"]);
        assert!(!accepted.contains(&"owner"));
        assert!(accepted.contains(&"maintainer"));

        assert!(registry.validate_name("owner", &["owner"]).is_err());
        assert_eq!(registry.validate_name("owner", &[]).unwrap(), 50);
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        assert!(AccessLevelRegistry::from_entries([("read", 1), ("write", 1)]).is_err());
        assert!(AccessLevelRegistry::from_entries([("read", 1), ("read", 2)]).is_err());

        let custom = AccessLevelRegistry::from_entries([("read", 1), ("write", 2)]).unwrap();
        assert_eq!(custom.code_to_name(2).unwrap(), "write");
    }

    #[test]
    fn test_access_level_ordering_and_parsing() {
        assert!(AccessLevel::Guest < AccessLevel::Maintainer);
        assert_eq!("REPORTER".parse::<AccessLevel>().unwrap(), AccessLevel::Reporter);
        assert_eq!(AccessLevel::try_from(40).unwrap(), AccessLevel::Maintainer);
        assert!(AccessLevel::try_from(41).is_err());

        let json = serde_json::to_string(&AccessLevel::Developer).unwrap();
        assert_eq!(json, "\"developer\"");
        let back: AccessLevel = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(back, AccessLevel::Owner);
    }
}
