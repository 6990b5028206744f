use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A three-component library version.
///
/// The zero value ([`Version::ZERO`], also the `Default`) means "unknown" or
/// "none" everywhere in this crate. Check [`Version::is_zero`] before treating
/// a version as meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub bugfix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected 1 to 3 dot-separated numbers, got: {input:?}")]
    InvalidFormat { input: String },
    #[error("Invalid version component {value:?} in {input:?}")]
    InvalidComponent { input: String, value: String },
}

impl Version {
    pub const ZERO: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u64, minor: u64, bugfix: u64) -> Self {
        Self {
            major,
            minor,
            bugfix,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Strict lexicographic comparison on (major, minor, bugfix).
    #[must_use]
    pub fn less(&self, other: &Self) -> bool {
        self < other
    }

    /// Best-effort parse.
    ///
    /// Version strings mostly come from remote release tags and marker files
    /// we don't control, so any malformed input yields [`Version::ZERO`]
    /// (with a warning logged) instead of an error. Use [`str::parse`] when
    /// the failure reason matters.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text.parse() {
            Ok(version) => version,
            Err(error) => {
                warn!("Treating unparseable version as zero: {error}");
                Self::ZERO
            }
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        }

        let mut components = [0_u64; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| VersionParseError::InvalidComponent {
                    input: s.to_string(),
                    value: (*part).to_string(),
                })?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.bugfix != 0 {
            write!(f, ".{}", self.bugfix)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
