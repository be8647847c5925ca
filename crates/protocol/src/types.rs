//! Identifiers and value domain for the shared dice session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved key under which the shared die face is stored.
///
/// Every usable session document contains this key; the session resolver
/// seeds it on the create path and verifies it on the join path.
pub const DICE_VALUE_KEY: &str = "dice-value-key";

/// Opaque, relay-assigned identity of a shared document.
///
/// Absent until the document is attached; the relay is the only party that
/// mints these, clients just carry them around (locator, fetch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A die face, guaranteed to be in `[1, 6]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DieFace(u8);

/// Rejected die face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("die face {0} is outside [1, 6]")]
pub struct FaceOutOfRange(pub i64);

impl DieFace {
    /// The face every freshly created session is seeded with.
    pub const ONE: DieFace = DieFace(1);

    pub fn new(face: u8) -> Result<Self, FaceOutOfRange> {
        match face {
            1..=6 => Ok(Self(face)),
            other => Err(FaceOutOfRange(i64::from(other))),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DieFace {
    type Error = FaceOutOfRange;

    fn try_from(face: i64) -> Result<Self, Self::Error> {
        u8::try_from(face)
            .ok()
            .and_then(|f| Self::new(f).ok())
            .ok_or(FaceOutOfRange(face))
    }
}

impl<'de> Deserialize<'de> for DieFace {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        DieFace::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for DieFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
