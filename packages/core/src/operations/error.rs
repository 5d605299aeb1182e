//! Error types for the placement engine
//!
//! The pure engine reports rule violations as `PlacementError`; the service
//! layer classifies them as invalid input or forbidden structure.

use thiserror::Error;

/// Errors raised while computing a placement or cascade
///
/// # Examples
///
/// ```rust
/// use pagetree_core::operations::PlacementError;
///
/// let err = PlacementError::AfterArchiveRoot {
///     archive_id: "arch:en:draft".to_string(),
/// };
/// assert!(!err.is_forbidden());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// Nothing may follow the archive root among the top-level pages
    #[error("Cannot place a page after the archive root '{archive_id}'")]
    AfterArchiveRoot { archive_id: String },

    /// `before`/`after` the tree root, which has no siblings
    #[error("The root page '{root_id}' has no siblings")]
    RootHasNoSiblings { root_id: String },

    /// The new parent is the page itself or one of its descendants
    #[error("Cannot move '{page_id}' under itself or its descendant '{parent_id}'")]
    SelfAncestor { page_id: String, parent_id: String },

    /// Published content may not live under a never-published parent
    #[error("Cannot place published page '{page_id}' under unpublished parent '{parent_id}'")]
    UnpublishedParent { page_id: String, parent_id: String },
}

impl PlacementError {
    /// Structural violations, as opposed to malformed requests
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::SelfAncestor { .. } | Self::UnpublishedParent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(PlacementError::SelfAncestor {
            page_id: "a".to_string(),
            parent_id: "b".to_string(),
        }
        .is_forbidden());
        assert!(!PlacementError::RootHasNoSiblings {
            root_id: "h".to_string(),
        }
        .is_forbidden());
    }

    #[test]
    fn test_messages() {
        let err = PlacementError::UnpublishedParent {
            page_id: "a:en:published".to_string(),
            parent_id: "p:en:published".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Cannot place published page 'a:en:published' under unpublished parent 'p:en:published'"
        );
    }
}
