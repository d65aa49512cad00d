use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("unknown module id: {0}")]
    Unknown(String),
}

/// Broad category of a learning module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    Game,
    Song,
}

impl ModuleKind {
    /// Tag stored in remote summaries (`type` field).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Game => "game",
            ModuleKind::Song => "song",
        }
    }
}

/// How a module turns round outcomes into score, stars and a completion flag.
///
/// Each call path has its own rule; there is no global star formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// +10 score and +1 star per correct round.
    PointsPerHit,
    /// Score is the accuracy percentage, stars are tiered from it.
    Accuracy,
    /// One star per three correct answers, plus a bonus for viewing every photo.
    Gallery,
    /// Completion depends on the share of the media that was watched.
    Media,
    /// Score is supplied by the caller when the module is finished.
    Completion,
}

/// Closed set of selectable learning modules.
///
/// The string ids are stable keys shared by the local cache and the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModuleId {
    FeedMonster,
    MemoryMatch,
    MatchLetter,
    FamilyGallery,
    WordBuilder,
    AbcSong,
    NumbersSong,
    ShapesSong,
    FamilyModule,
}

impl ModuleId {
    pub const ALL: [ModuleId; 9] = [
        ModuleId::FeedMonster,
        ModuleId::MemoryMatch,
        ModuleId::MatchLetter,
        ModuleId::FamilyGallery,
        ModuleId::WordBuilder,
        ModuleId::AbcSong,
        ModuleId::NumbersSong,
        ModuleId::ShapesSong,
        ModuleId::FamilyModule,
    ];

    pub const SONGS: [ModuleId; 3] = [ModuleId::AbcSong, ModuleId::NumbersSong, ModuleId::ShapesSong];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::FeedMonster => "feed_monster",
            ModuleId::MemoryMatch => "memory_match",
            ModuleId::MatchLetter => "match_letter",
            ModuleId::FamilyGallery => "family_gallery",
            ModuleId::WordBuilder => "word_builder",
            ModuleId::AbcSong => "abc_song",
            ModuleId::NumbersSong => "numbers_song",
            ModuleId::ShapesSong => "shapes_song",
            ModuleId::FamilyModule => "family_module",
        }
    }

    /// Label shown to parents on reports.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ModuleId::FeedMonster => "Feed the Monster",
            ModuleId::MemoryMatch => "Memory Match",
            ModuleId::MatchLetter => "Match the Letter",
            ModuleId::FamilyGallery => "Family Gallery",
            ModuleId::WordBuilder => "Word Builder",
            ModuleId::AbcSong => "ABC Song",
            ModuleId::NumbersSong => "123 Song",
            ModuleId::ShapesSong => "Shapes Song",
            ModuleId::FamilyModule => "Family Module",
        }
    }

    #[must_use]
    pub fn kind(self) -> ModuleKind {
        match self {
            ModuleId::AbcSong | ModuleId::NumbersSong | ModuleId::ShapesSong => ModuleKind::Song,
            _ => ModuleKind::Game,
        }
    }

    #[must_use]
    pub fn scoring(self) -> ScoringPolicy {
        match self {
            ModuleId::FeedMonster | ModuleId::MemoryMatch | ModuleId::MatchLetter => {
                ScoringPolicy::PointsPerHit
            }
            ModuleId::WordBuilder => ScoringPolicy::Accuracy,
            ModuleId::FamilyGallery => ScoringPolicy::Gallery,
            ModuleId::AbcSong | ModuleId::NumbersSong | ModuleId::ShapesSong => {
                ScoringPolicy::Media
            }
            ModuleId::FamilyModule => ScoringPolicy::Completion,
        }
    }

    #[must_use]
    pub fn is_song(self) -> bool {
        self.kind() == ModuleKind::Song
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ModuleId::ALL
            .into_iter()
            .find(|m| m.as_str() == needle)
            .ok_or_else(|| ModuleError::Unknown(s.to_owned()))
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ModuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(value: ModuleId) -> Self {
        value.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_back_to_variants() {
        for module in ModuleId::ALL {
            assert_eq!(module.as_str().parse::<ModuleId>().unwrap(), module);
        }
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let err = "future_mini_game".parse::<ModuleId>().unwrap_err();
        assert_eq!(err, ModuleError::Unknown("future_mini_game".into()));
    }

    #[test]
    fn songs_use_media_scoring() {
        for song in ModuleId::SONGS {
            assert_eq!(song.kind(), ModuleKind::Song);
            assert_eq!(song.scoring(), ScoringPolicy::Media);
        }
        assert_eq!(ModuleId::WordBuilder.scoring(), ScoringPolicy::Accuracy);
        assert_eq!(ModuleId::NumbersSong.display_name(), "123 Song");
    }
}
