use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::query::QueryId;
use crate::flows::RunState;

/// One state-transition notification. The notification collaborator drains
/// these independently of the run that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_id: String,
    pub query_id: QueryId,
    pub stage: RunState,
    pub attempt: u32,
    pub payload: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(query_id: QueryId, stage: RunState, attempt: u32) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            query_id,
            stage,
            attempt,
            payload: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Delivery of progress events must never block or fail the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn stages(&self) -> Vec<RunState> {
        self.events().into_iter().map(|event| event.stage).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
