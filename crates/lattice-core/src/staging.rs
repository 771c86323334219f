use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{ExtractedEntity, TypedEdge};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingReview,
    Committing,
    Committed,
    Discarded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Entity,
    Relationship,
}

/// The reviewed unit: one extracted entity or relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemPayload {
    Entity(ExtractedEntity),
    Relationship(TypedEdge),
}

impl ItemPayload {
    pub fn item_kind(&self) -> ItemKind {
        match self {
            ItemPayload::Entity(_) => ItemKind::Entity,
            ItemPayload::Relationship(_) => ItemKind::Relationship,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub payload: ItemPayload,
    pub confidence: f64,
    /// Set when confidence fell below the extractor's threshold; the item is
    /// still surfaced for review.
    #[serde(default)]
    pub low_confidence: bool,
    pub status: ItemStatus,
    #[serde(default)]
    pub edited: bool,
    /// Audit trail of reviewer edits, most recent last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<ItemEdit>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEdit {
    pub at: DateTime<Utc>,
    /// Field-level patch the reviewer applied.
    pub patch: serde_json::Value,
}

impl StagingItem {
    pub fn new(payload: ItemPayload, confidence: f64, low_confidence: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: payload.item_kind(),
            payload,
            confidence,
            low_confidence,
            status: ItemStatus::Pending,
            edited: false,
            edits: Vec::new(),
            created_at: Utc::now(),
            decided_at: None,
            commit_error: None,
        }
    }

    /// Status transitions are monotonic except the explicit reopen back to
    /// pending. A transition to the current status is a no-op.
    pub fn can_transition(&self, to: ItemStatus) -> bool {
        match (self.status, to) {
            (a, b) if a == b => true,
            (ItemStatus::Pending, ItemStatus::Approved) => true,
            (ItemStatus::Pending, ItemStatus::Rejected) => true,
            (ItemStatus::Approved, ItemStatus::Pending) => true,
            (ItemStatus::Rejected, ItemStatus::Pending) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusCounts {
    fn record(&mut self, status: ItemStatus) {
        self.total += 1;
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Approved => self.approved += 1,
            ItemStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Fold of item statuses; recomputed on every state transition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatistics {
    pub entities: StatusCounts,
    pub relationships: StatusCounts,
    #[serde(default)]
    pub extraction_errors: usize,
    #[serde(default)]
    pub commit_failures: usize,
}

impl SessionStatistics {
    pub fn compute(items: &[StagingItem], extraction_errors: usize) -> Self {
        let mut stats = SessionStatistics {
            extraction_errors,
            ..Default::default()
        };
        for item in items {
            match item.kind {
                ItemKind::Entity => stats.entities.record(item.status),
                ItemKind::Relationship => stats.relationships.record(item.status),
            }
            if item.commit_error.is_some() {
                stats.commit_failures += 1;
            }
        }
        stats
    }
}

/// The persistent review context for one document's extractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSession {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_title: String,
    pub document_source: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub statistics: SessionStatistics,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CompanyEntity, PersonEntity};

    fn person_item(status: ItemStatus) -> StagingItem {
        let mut item = StagingItem::new(
            ItemPayload::Entity(ExtractedEntity::Person(PersonEntity {
                name: "John Smith".into(),
                ..Default::default()
            })),
            0.9,
            false,
        );
        item.status = status;
        item
    }

    #[test]
    fn transitions_allow_reopen_only() {
        let mut item = person_item(ItemStatus::Pending);
        assert!(item.can_transition(ItemStatus::Approved));
        assert!(item.can_transition(ItemStatus::Rejected));

        item.status = ItemStatus::Approved;
        assert!(item.can_transition(ItemStatus::Pending));
        assert!(!item.can_transition(ItemStatus::Rejected));

        item.status = ItemStatus::Rejected;
        assert!(item.can_transition(ItemStatus::Pending));
        assert!(!item.can_transition(ItemStatus::Approved));
    }

    #[test]
    fn statistics_fold_adds_up_per_kind() {
        let items = vec![
            person_item(ItemStatus::Approved),
            person_item(ItemStatus::Pending),
            person_item(ItemStatus::Rejected),
        ];
        let stats = SessionStatistics::compute(&items, 1);
        assert_eq!(stats.entities.total, 3);
        assert_eq!(
            stats.entities.approved + stats.entities.rejected + stats.entities.pending,
            stats.entities.total
        );
        assert_eq!(stats.relationships.total, 0);
        assert_eq!(stats.extraction_errors, 1);
    }

    #[test]
    fn item_payload_round_trips() {
        let item = StagingItem::new(
            ItemPayload::Entity(ExtractedEntity::Company(CompanyEntity {
                name: "TechCorp Inc.".into(),
                founded_year: Some(2020),
                ..Default::default()
            })),
            0.95,
            false,
        );
        let json = serde_json::to_string(&item).unwrap();
        let back: StagingItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ItemKind::Entity);
        assert_eq!(back.payload, item.payload);
    }
}
