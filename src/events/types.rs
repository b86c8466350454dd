use crate::events::payload::Payload;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identifier assigned to every accepted event
pub type EventId = Uuid;

/// Event accepted into the dispatch queue
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub id: EventId,
    pub routing_key: String,
    pub payload: Payload,
    pub published_at: DateTime<Utc>,
}

impl PublishedEvent {
    pub fn new(routing_key: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            routing_key: routing_key.into(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Result of one handler invocation for one event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Succeeded {
        use_case: String,
        event_id: EventId,
        routing_key: String,
        attempts: u32,
    },
    Failed {
        use_case: String,
        event_id: EventId,
        routing_key: String,
        attempts: u32,
        error: String,
    },
}

impl DispatchOutcome {
    pub fn use_case(&self) -> &str {
        match self {
            Self::Succeeded { use_case, .. } | Self::Failed { use_case, .. } => use_case,
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            Self::Succeeded { event_id, .. } | Self::Failed { event_id, .. } => *event_id,
        }
    }

    pub fn routing_key(&self) -> &str {
        match self {
            Self::Succeeded { routing_key, .. } | Self::Failed { routing_key, .. } => routing_key,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Error message if the invocation failed
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Succeeded { .. } => None,
        }
    }
}

/// Event a handler could not process after exhausting its attempts
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub use_case: String,
    pub event: PublishedEvent,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
