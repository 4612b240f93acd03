//! Package identity strings.
//!
//! A package id is `name;version;arch;data`. Only the name is mandatory,
//! the other fields may be empty depending on the role that produced it.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const DELIMITER: char = ';';
const FIELDS: usize = 4;

/// A parsed package id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    /// Package name, never empty.
    pub name: String,
    /// Version, possibly empty.
    pub version: String,
    /// Architecture, possibly empty.
    pub arch: String,
    /// Backend data, usually the repository.
    pub data: String,
}

impl PackageId {
    /// Creates a package id from its parts.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            data: data.into(),
        }
    }

    /// Parses `name;version;arch;data`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut parts = text.split(DELIMITER);
        let (Some(name), Some(version), Some(arch), Some(data), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(CoreError::invalid_package_id(format!(
                "'{text}' does not have {FIELDS} sections"
            )));
        };
        if name.is_empty() {
            return Err(CoreError::invalid_package_id(format!(
                "'{text}' has an empty name"
            )));
        }
        Ok(Self::new(name, version, arch, data))
    }

    /// Returns true if the text is a valid package id.
    pub fn check(text: &str) -> bool {
        text.split(DELIMITER).count() == FIELDS
            && text.split(DELIMITER).next().is_some_and(|name| !name.is_empty())
    }

    /// Returns the id as `name;version;arch;data`.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            self.name, self.version, self.arch, self.data
        )
    }
}

impl FromStr for PackageId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Returns true if the list is non-empty and every entry is a valid id.
pub fn package_ids_check<S: AsRef<str>>(ids: &[S]) -> bool {
    !ids.is_empty() && ids.iter().all(|id| PackageId::check(id.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_id() {
        let id = PackageId::parse("foo;1.0;x86_64;repo").unwrap();
        assert_eq!(id.name, "foo");
        assert_eq!(id.version, "1.0");
        assert_eq!(id.arch, "x86_64");
        assert_eq!(id.data, "repo");
        assert_eq!(id.to_text(), "foo;1.0;x86_64;repo");
    }

    #[test]
    fn optional_fields_may_be_empty() {
        let id = PackageId::parse("foo;;;").unwrap();
        assert_eq!(id.name, "foo");
        assert!(id.version.is_empty());
        assert!(PackageId::check("foo;;;"));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(PackageId::parse(";1.0;x86_64;repo").is_err());
        assert!(!PackageId::check(";1.0;x86_64;repo"));
    }

    #[test]
    fn wrong_section_count_is_rejected() {
        assert!(!PackageId::check("foo"));
        assert!(!PackageId::check("foo;1.0;x86_64"));
        assert!(!PackageId::check("foo;1.0;x86_64;repo;extra"));
        assert!(PackageId::parse("foo;1.0").is_err());
    }

    #[test]
    fn list_check() {
        assert!(package_ids_check(&["a;1;i386;r", "b;;;"]));
        assert!(!package_ids_check(&["a;1;i386;r", "b"]));
        assert!(!package_ids_check::<&str>(&[]));
    }
}
