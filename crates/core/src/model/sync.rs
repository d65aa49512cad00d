use std::fmt;

/// Local tables whose rows can be queued for a later push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTable {
    ChildProgress,
    ChildProfiles,
}

impl SyncTable {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncTable::ChildProgress => "child_progress",
            SyncTable::ChildProfiles => "child_profiles",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "child_progress" => Some(SyncTable::ChildProgress),
            "child_profiles" => Some(SyncTable::ChildProfiles),
            _ => None,
        }
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Upsert,
    Delete,
}

impl SyncOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::Upsert => "upsert",
            SyncOperation::Delete => "delete",
        }
    }

    /// Unknown values read back from disk are treated as upserts.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("delete") {
            SyncOperation::Delete
        } else {
            SyncOperation::Upsert
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "synced" => SyncStatus::Synced,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::Pending,
        }
    }
}

/// A local write that has not reached the remote store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueItem {
    pub id: i64,
    pub table: SyncTable,
    pub record_id: String,
    pub operation: SyncOperation,
    pub status: SyncStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
}
