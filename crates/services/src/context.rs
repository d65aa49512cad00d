use buds_core::model::{ChildId, ParentId};

use crate::error::ProgressError;

/// Who is playing: the signed-in parent and the selected child.
///
/// Passed explicitly to every save. Either id may be missing, for example before
/// sign-in completes or when no child slot is selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub parent_id: Option<ParentId>,
    pub child_id: Option<ChildId>,
}

impl SessionContext {
    #[must_use]
    pub fn new(parent_id: ParentId, child_id: ChildId) -> Self {
        Self {
            parent_id: Some(parent_id),
            child_id: Some(child_id),
        }
    }

    /// Both ids, or the error describing which one is missing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotAuthenticated` without a parent and
    /// `ProgressError::MissingIdentifier` without a child.
    pub fn require(&self) -> Result<(&ParentId, &ChildId), ProgressError> {
        let parent = self
            .parent_id
            .as_ref()
            .ok_or(ProgressError::NotAuthenticated)?;
        let child = self
            .child_id
            .as_ref()
            .ok_or(ProgressError::MissingIdentifier("child id"))?;
        Ok((parent, child))
    }
}
