use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::module::ModuleId;

/// Errors raised when an identifier cannot be constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("invalid child slot: {0}")]
    InvalidSlot(u8),
}

fn normalize(kind: &'static str, raw: &str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    Ok(trimmed.to_owned())
}

/// Identifier of an authenticated parent account.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParentId(String);

impl ParentId {
    /// Creates a new `ParentId`.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is blank.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        normalize("ParentId", raw.as_ref()).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a child profile.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChildId(String);

impl ChildId {
    /// Creates a new `ChildId`.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is blank.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        normalize("ChildId", raw.as_ref()).map(Self)
    }

    /// Deterministic id of one of a parent's fixed profile slots (`1..=5`).
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidSlot` when the slot is outside the allowed range.
    pub fn for_slot(parent: &ParentId, slot: u8) -> Result<Self, IdError> {
        if slot == 0 || slot > crate::model::MAX_CHILD_SLOTS {
            return Err(IdError::InvalidSlot(slot));
        }
        Ok(Self(format!("{}_child_{slot}", parent.as_str())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic key for a child's summary of one module.
///
/// Rendered as `{childId}_{moduleId}` so repeated writes land on one document.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ProgressKey {
    pub child: ChildId,
    pub module: ModuleId,
}

impl ProgressKey {
    #[must_use]
    pub fn new(child: ChildId, module: ModuleId) -> Self {
        Self { child, module }
    }
}

// ─── Debug / Display ───────────────────────────────────────────────────────────

impl fmt::Debug for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParentId({})", self.0)
    }
}

impl fmt::Debug for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildId({})", self.0)
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.child, self.module.as_str())
    }
}

// ─── Conversions ───────────────────────────────────────────────────────────────

impl FromStr for ParentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl FromStr for ChildId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ParentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for ChildId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParentId> for String {
    fn from(value: ParentId) -> Self {
        value.0
    }
}

impl From<ChildId> for String {
    fn from(value: ChildId) -> Self {
        value.0
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
