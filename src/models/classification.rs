//! Classification result types.

use serde::{Deserialize, Serialize};

use super::EventId;

/// Outcome of classifying one event.
///
/// Exactly one result is produced per accepted input event, in input order.
/// `representative_id` and `similarity_score` are populated only for
/// duplicates.
///
/// # Example
///
/// ```rust
/// use alertdedup::models::{ClassificationResult, EventId};
///
/// let result = ClassificationResult::duplicate(EventId::new("2"), EventId::new("1"), 100.0);
/// assert!(result.is_duplicate);
/// assert_eq!(result.similarity_score, Some(100.0));
///
/// let novel = ClassificationResult::novel(EventId::new("3"));
/// assert!(novel.representative_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Id of the classified event.
    pub event_id: EventId,

    /// Whether the event near-duplicates a recent event.
    pub is_duplicate: bool,

    /// Root event this one duplicates. Never itself a duplicate.
    pub representative_id: Option<EventId>,

    /// Similarity (0-100) against the best matching window entry.
    pub similarity_score: Option<f64>,
}

impl ClassificationResult {
    /// Creates a result for an event that matched nothing in the window.
    #[must_use]
    pub const fn novel(event_id: EventId) -> Self {
        Self {
            event_id,
            is_duplicate: false,
            representative_id: None,
            similarity_score: None,
        }
    }

    /// Creates a result linking an event to its root representative.
    #[must_use]
    pub const fn duplicate(event_id: EventId, representative_id: EventId, score: f64) -> Self {
        Self {
            event_id,
            is_duplicate: true,
            representative_id: Some(representative_id),
            similarity_score: Some(score),
        }
    }

    /// Returns the root this event belongs to: its representative, or itself.
    #[must_use]
    pub fn root_id(&self) -> &EventId {
        self.representative_id.as_ref().unwrap_or(&self.event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novel_result() {
        let result = ClassificationResult::novel(EventId::new("1"));
        assert!(!result.is_duplicate);
        assert!(result.similarity_score.is_none());
        assert_eq!(result.root_id().as_str(), "1");
    }

    #[test]
    fn test_duplicate_result_root() {
        let result = ClassificationResult::duplicate(EventId::new("5"), EventId::new("2"), 97.0);
        assert_eq!(result.root_id().as_str(), "2");
    }

    #[test]
    fn test_serialized_shape() {
        let result = ClassificationResult::duplicate(EventId::new("2"), EventId::new("1"), 100.0);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["event_id"], "2");
        assert_eq!(json["is_duplicate"], true);
        assert_eq!(json["representative_id"], "1");
        assert_eq!(json["similarity_score"], 100.0);

        let novel = serde_json::to_value(ClassificationResult::novel(EventId::new("3"))).unwrap();
        assert!(novel["representative_id"].is_null());
    }
}
