use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A natural-language request. Fields are private so a query cannot change
/// after it has been submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    id: QueryId,
    text: String,
    conversation_id: String,
    submitted_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self::with_timestamp(text, conversation_id, Utc::now())
    }

    pub fn with_timestamp(
        text: impl Into<String>,
        conversation_id: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueryId::generate(),
            text: text.into(),
            conversation_id: conversation_id.into(),
            submitted_at,
        }
    }

    pub fn id(&self) -> &QueryId {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(Query::new("   \n\t", "conv-1").is_blank());
        assert!(!Query::new(" what is rust? ", "conv-1").is_blank());
    }

    #[test]
    fn each_query_receives_a_distinct_id() {
        let first = Query::new("a", "conv-1");
        let second = Query::new("a", "conv-1");
        assert_ne!(first.id(), second.id());
    }
}
