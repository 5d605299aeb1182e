//! Domain Events for the page tree
//!
//! Structural operations announce themselves on a tokio broadcast channel so
//! other parts of the system (caches, search indexes, notification layers)
//! can react without coupling to the orchestrator.
//!
//! # Event Flow
//!
//! 1. `PageTree` validates and performs a mutation under the tree lock
//! 2. `BeforeMove` fires after validation, before any write of a move
//! 3. The matching post event fires once every write has landed
//! 4. Subscribers receive events asynchronously; sends never block

use crate::models::{ChangeSet, PageChange, Position};
use serde::Serialize;

/// Domain events emitted by `PageTree`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// A page was inserted
    #[serde(rename_all = "camelCase")]
    PageInserted { page: PageChange },

    /// A move passed validation and is about to be written
    #[serde(rename_all = "camelCase")]
    BeforeMove {
        page_id: String,
        target_id: String,
        position: Position,
    },

    /// A move completed
    #[serde(rename_all = "camelCase")]
    AfterMove { page_id: String, changes: ChangeSet },

    /// A page was moved into the archive
    #[serde(rename_all = "camelCase")]
    PageArchived { page_id: String, parent_slug: String },

    /// A page was moved out of the archive
    #[serde(rename_all = "camelCase")]
    PageRestored { page_id: String },

    /// Non-structural fields of a page were updated
    #[serde(rename_all = "camelCase")]
    PageUpdated { page_id: String },

    /// A draft was copied to its published variant
    #[serde(rename_all = "camelCase")]
    PagePublished { page_id: String },

    /// A page was copied into another locale
    #[serde(rename_all = "camelCase")]
    PageLocalized { page_id: String, locale: String },

    /// A page was deleted
    #[serde(rename_all = "camelCase")]
    PageDeleted { page_id: String },

    /// A parked page was created or had its parked fields restored
    #[serde(rename_all = "camelCase")]
    ParkedPageReconciled { page_id: String, created: bool },
}

impl TreeEvent {
    /// String representation of the event type, for logging
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::PageInserted { .. } => "page:inserted",
            TreeEvent::BeforeMove { .. } => "page:before-move",
            TreeEvent::AfterMove { .. } => "page:after-move",
            TreeEvent::PageArchived { .. } => "page:archived",
            TreeEvent::PageRestored { .. } => "page:restored",
            TreeEvent::PageUpdated { .. } => "page:updated",
            TreeEvent::PagePublished { .. } => "page:published",
            TreeEvent::PageLocalized { .. } => "page:localized",
            TreeEvent::PageDeleted { .. } => "page:deleted",
            TreeEvent::ParkedPageReconciled { .. } => "parked:reconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: the JSON shape is internally tagged and flat
    #[test]
    fn test_before_move_serialization_contract() {
        let event = TreeEvent::BeforeMove {
            page_id: "a:en:draft".to_string(),
            target_id: "h:en:draft".to_string(),
            position: Position::FirstChild,
        };

        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "beforeMove");
        assert_eq!(parsed["pageId"], "a:en:draft");
        assert_eq!(parsed["targetId"], "h:en:draft");
        assert_eq!(parsed["position"], "firstChild");
    }

    #[test]
    fn test_event_type_names() {
        let event = TreeEvent::PageDeleted {
            page_id: "a:en:draft".to_string(),
        };
        assert_eq!(event.event_type(), "page:deleted");
    }
}
