use crate::decoder::RawRecord;
use serde_json::Value;
use tracing::trace;

/// A record selected for personalization. Its user id is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleRecord {
    user_id: String,
    record: RawRecord,
}

impl EligibleRecord {
    /// User identity the generated content is stored under
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Event properties used to personalize the prompt
    pub fn properties(&self) -> &Value {
        &self.record.properties
    }
}

/// Outcome of classifying one record
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    /// Target event with a usable user id
    Eligible(EligibleRecord),
    /// Target event without a usable user id; counted as an error
    MissingKey,
    /// Any other event; dropped silently
    Skip,
}

/// Selects the events that get personalized content
#[derive(Debug, Clone)]
pub struct EventFilter {
    target_event: String,
}

impl EventFilter {
    /// Create a filter for the given event name
    pub fn new(target_event: impl Into<String>) -> Self {
        Self {
            target_event: target_event.into(),
        }
    }

    /// Event name this filter selects
    pub fn target_event(&self) -> &str {
        &self.target_event
    }

    /// Pure eligibility predicate
    pub fn is_eligible(&self, record: &RawRecord) -> bool {
        record.name == self.target_event && has_user_id(record)
    }

    /// Classify a record, taking ownership of it when eligible
    pub fn classify(&self, record: RawRecord) -> Eligibility {
        if record.name != self.target_event {
            trace!(name = %record.name, "Skipping non-target event");
            return Eligibility::Skip;
        }

        if !has_user_id(&record) {
            return Eligibility::MissingKey;
        }

        let user_id = record.user_id.clone().unwrap_or_default();
        Eligibility::Eligible(EligibleRecord { user_id, record })
    }
}

fn has_user_id(record: &RawRecord) -> bool {
    record.user_id.as_deref().is_some_and(|id| !id.is_empty())
}
