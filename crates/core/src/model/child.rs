use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChildId, IdError, ParentId};
use crate::rollup::Rollup;

/// Avatar key used by empty profile slots.
pub const PLACEHOLDER_AVATAR: &str = "ic_child_avatar_placeholder";
/// Upper bound on custom vocabulary words per child.
pub const MAX_CUSTOM_WORDS: usize = 4;
/// Longest accepted custom word, in characters.
pub const MAX_WORD_LEN: usize = 8;
pub const MIN_NAME_LEN: usize = 2;
pub const MIN_CHILD_AGE: u8 = 1;
pub const MAX_CHILD_AGE: u8 = 10;
/// Longest accepted name, in words.
pub const MAX_NAME_WORDS: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChildProfileError {
    #[error("child name cannot be empty")]
    EmptyName,

    #[error("child name must be at least {MIN_NAME_LEN} characters")]
    NameTooShort,

    #[error("child name must be at most {MAX_NAME_WORDS} words")]
    NameTooLong,

    #[error("age must be between {MIN_CHILD_AGE} and {MAX_CHILD_AGE}, got {0}")]
    InvalidAge(u8),

    #[error("at most {MAX_CUSTOM_WORDS} custom words are allowed, got {0}")]
    TooManyWords(usize),

    #[error("custom word '{0}' is longer than {MAX_WORD_LEN} letters")]
    WordTooLong(String),

    #[error(transparent)]
    Id(#[from] IdError),
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Parent-edited profile fields, validated before they touch a stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChildProfileDraft {
    pub name: String,
    pub age: u8,
    pub gender: Option<String>,
    pub learning_level: Option<String>,
    pub avatar: Option<String>,
    pub words: Vec<String>,
}

impl ChildProfileDraft {
    /// Checks the draft and returns it with trimmed fields and blank words dropped.
    ///
    /// # Errors
    ///
    /// Returns a `ChildProfileError` describing the first invalid field.
    pub fn validate(self) -> Result<Self, ChildProfileError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ChildProfileError::EmptyName);
        }
        if name.chars().count() < MIN_NAME_LEN {
            return Err(ChildProfileError::NameTooShort);
        }
        if name.split_whitespace().count() > MAX_NAME_WORDS {
            return Err(ChildProfileError::NameTooLong);
        }
        if !(MIN_CHILD_AGE..=MAX_CHILD_AGE).contains(&self.age) {
            return Err(ChildProfileError::InvalidAge(self.age));
        }

        let words: Vec<String> = self
            .words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(str::to_owned)
            .collect();
        if words.len() > MAX_CUSTOM_WORDS {
            return Err(ChildProfileError::TooManyWords(words.len()));
        }
        if let Some(long) = words.iter().find(|w| w.chars().count() > MAX_WORD_LEN) {
            return Err(ChildProfileError::WordTooLong(long.clone()));
        }

        Ok(Self {
            name,
            age: self.age,
            gender: non_blank(self.gender),
            learning_level: non_blank(self.learning_level),
            avatar: non_blank(self.avatar),
            words,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

/// A child profile occupying one of a parent's fixed slots.
///
/// Profiles are never deleted. Resetting restores the placeholder values and keeps
/// the identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub child_id: ChildId,
    pub parent_id: ParentId,
    pub slot: u8,
    pub name: String,
    pub age: u8,
    pub gender: Option<String>,
    pub learning_level: Option<String>,
    pub avatar: String,
    pub words: Vec<String>,
    pub stars: u32,
    pub completed_modules: u32,
    pub progress: u32,
    pub rollup_version: u64,
    pub active: bool,
    pub updated_at_ms: i64,
}

impl ChildProfile {
    /// Placeholder profile for slot `n`: "Child n", no words, zero progress.
    ///
    /// # Errors
    ///
    /// Returns `IdError::InvalidSlot` when the slot is outside `1..=5`.
    pub fn placeholder(parent: &ParentId, slot: u8, now_ms: i64) -> Result<Self, IdError> {
        let child_id = ChildId::for_slot(parent, slot)?;
        Ok(Self {
            child_id,
            parent_id: parent.clone(),
            slot,
            name: format!("Child {slot}"),
            age: 0,
            gender: None,
            learning_level: None,
            avatar: PLACEHOLDER_AVATAR.to_owned(),
            words: Vec::new(),
            stars: 0,
            completed_modules: 0,
            progress: 0,
            rollup_version: 0,
            active: true,
            updated_at_ms: now_ms,
        })
    }

    /// Whether the slot still holds untouched placeholder values.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.age == 0 && self.avatar == PLACEHOLDER_AVATAR && self.words.is_empty()
    }

    /// Restores placeholder values in place.
    pub fn reset(&mut self, now_ms: i64) {
        self.name = format!("Child {}", self.slot);
        self.age = 0;
        self.gender = None;
        self.learning_level = None;
        self.avatar = PLACEHOLDER_AVATAR.to_owned();
        self.words.clear();
        self.stars = 0;
        self.completed_modules = 0;
        self.progress = 0;
        self.active = true;
        self.updated_at_ms = now_ms;
    }

    /// Applies a validated draft.
    pub fn apply_draft(&mut self, draft: ChildProfileDraft, now_ms: i64) {
        self.name = draft.name;
        self.age = draft.age;
        self.gender = draft.gender;
        self.learning_level = draft.learning_level;
        if let Some(avatar) = draft.avatar {
            self.avatar = avatar;
        }
        self.words = draft.words;
        self.updated_at_ms = now_ms;
    }

    pub fn apply_rollup(&mut self, rollup: &Rollup, version: u64, now_ms: i64) {
        self.progress = rollup.progress_percent;
        self.stars = rollup.stars;
        self.completed_modules = rollup.completed_modules;
        self.rollup_version = version;
        self.updated_at_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, age: u8, words: &[&str]) -> ChildProfileDraft {
        ChildProfileDraft {
            name: name.into(),
            age,
            words: words.iter().map(|w| (*w).to_owned()).collect(),
            ..ChildProfileDraft::default()
        }
    }

    #[test]
    fn placeholder_uses_slot_number() {
        let parent = ParentId::new("p1").unwrap();
        let profile = ChildProfile::placeholder(&parent, 2, 0).unwrap();
        assert_eq!(profile.child_id.as_str(), "p1_child_2");
        assert_eq!(profile.name, "Child 2");
        assert_eq!(profile.avatar, PLACEHOLDER_AVATAR);
        assert!(profile.is_placeholder());
        assert!(ChildProfile::placeholder(&parent, 6, 0).is_err());
    }

    #[test]
    fn reset_keeps_identity() {
        let parent = ParentId::new("p1").unwrap();
        let mut profile = ChildProfile::placeholder(&parent, 4, 0).unwrap();
        profile.apply_draft(draft("Ada", 6, &["cat", "dog"]).validate().unwrap(), 10);
        profile.stars = 3;
        profile.reset(20);
        assert_eq!(profile.child_id.as_str(), "p1_child_4");
        assert_eq!(profile.name, "Child 4");
        assert!(profile.is_placeholder());
        assert_eq!(profile.stars, 0);
        assert_eq!(profile.updated_at_ms, 20);
    }

    #[test]
    fn draft_validation() {
        assert_eq!(draft("  ", 5, &[]).validate(), Err(ChildProfileError::EmptyName));
        assert_eq!(draft("A", 5, &[]).validate(), Err(ChildProfileError::NameTooShort));
        assert_eq!(draft("Ada", 11, &[]).validate(), Err(ChildProfileError::InvalidAge(11)));
        assert_eq!(draft("Ada", 0, &[]).validate(), Err(ChildProfileError::InvalidAge(0)));
        assert_eq!(
            draft("Ada", 5, &["a", "b", "c", "d", "e"]).validate(),
            Err(ChildProfileError::TooManyWords(5))
        );
        assert_eq!(
            draft("Ada", 5, &["elephants"]).validate(),
            Err(ChildProfileError::WordTooLong("elephants".into()))
        );

        let ok = draft(" Ada ", 5, &["cat", " ", "mom"]).validate().unwrap();
        assert_eq!(ok.name, "Ada");
        assert_eq!(ok.words, vec!["cat".to_owned(), "mom".to_owned()]);
    }
}
