//! Migration versions.
//!
//! A version is an ordered sequence of non-negative integers of arbitrary
//! size, written dot-separated (`1.2.3`) or underscore-separated (`1_2_3`).
//! Trailing zero components are not significant, so `1.0` and `1.0.0` are
//! equal. Four sentinel versions exist for targets and empty histories.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One numeric component of a version, kept as normalized decimal digits.
///
/// Digits are stored without leading zeros (`"0"` for zero), which makes
/// comparison a length check followed by a lexicographic one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Component(String);

impl Component {
    fn zero() -> Self {
        Component("0".to_string())
    }

    fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = text.trim_start_matches('0');
        if trimmed.is_empty() {
            Some(Self::zero())
        } else {
            Some(Component(trimmed.to_string()))
        }
    }

    fn is_zero(&self) -> bool {
        self.0 == "0"
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Empty,
    Current,
    Next,
    Numeric { parts: Vec<Component>, text: String },
    Latest,
}

impl Repr {
    /// Position of the variant in the total order.
    fn rank(&self) -> u8 {
        match self {
            Repr::Empty => 0,
            Repr::Current => 1,
            Repr::Next => 2,
            Repr::Numeric { .. } => 3,
            Repr::Latest => 4,
        }
    }
}

/// A migration version.
#[derive(Debug, Clone)]
pub struct Version {
    repr: Repr,
}

impl Version {
    /// Version of an empty schema history. Sorts before every real version.
    pub const EMPTY: Version = Version { repr: Repr::Empty };

    /// Symbolic target: the version currently applied.
    pub const CURRENT: Version = Version {
        repr: Repr::Current,
    };

    /// Symbolic target: the next resolved version above the current one.
    pub const NEXT: Version = Version { repr: Repr::Next };

    /// Symbolic target: the latest resolved version. Sorts after every real version.
    pub const LATEST: Version = Version { repr: Repr::Latest };

    /// Parse a version string.
    ///
    /// Accepts `current`, `next` and `latest` (case-insensitive) for the
    /// sentinels; everything else must be numeric components separated by
    /// `.` or `_`.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "current" => return Ok(Self::CURRENT),
            "next" => return Ok(Self::NEXT),
            "latest" => return Ok(Self::LATEST),
            _ => {}
        }

        let normalized = trimmed.replace('_', ".");
        if normalized.is_empty() {
            return Err(Error::InvalidVersionFormat {
                text: text.to_string(),
                reason: "version is empty".to_string(),
            });
        }

        let mut parts = Vec::new();
        for piece in normalized.split('.') {
            let component = Component::parse(piece).ok_or_else(|| Error::InvalidVersionFormat {
                text: text.to_string(),
                reason: format!("'{}' is not a non-negative integer", piece),
            })?;
            parts.push(component);
        }

        while parts.len() > 1 && parts.last().is_some_and(Component::is_zero) {
            parts.pop();
        }

        Ok(Version {
            repr: Repr::Numeric {
                parts,
                text: normalized,
            },
        })
    }

    /// Whether this is one of the four sentinel versions.
    pub fn is_sentinel(&self) -> bool {
        !matches!(self.repr, Repr::Numeric { .. })
    }

    /// Whether this is CURRENT, NEXT or LATEST.
    pub fn is_symbolic_target(&self) -> bool {
        matches!(self.repr, Repr::Current | Repr::Next | Repr::Latest)
    }

    /// The dot-separated text of a numeric version, or the sentinel name.
    pub fn as_str(&self) -> &str {
        match &self.repr {
            Repr::Empty => "<< Empty Schema >>",
            Repr::Current => "current",
            Repr::Next => "next",
            Repr::Latest => "latest",
            Repr::Numeric { text, .. } => text,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.repr, &other.repr) {
            (Repr::Numeric { parts: a, .. }, Repr::Numeric { parts: b, .. }) => {
                let zero = Component::zero();
                let len = a.len().max(b.len());
                for i in 0..len {
                    let left = a.get(i).unwrap_or(&zero);
                    let right = b.get(i).unwrap_or(&zero);
                    match left.cmp(right) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                Ordering::Equal
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr.rank().hash(state);
        if let Repr::Numeric { parts, .. } = &self.repr {
            parts.hash(state);
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Version::parse(&text).map_err(serde::de::Error::custom)
    }
}
