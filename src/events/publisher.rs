use crate::dispatch::lifecycle::DispatcherState;
use crate::error::{EventError, Result};
use crate::events::payload::Payload;
use crate::events::types::{EventId, PublishedEvent};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info_span};

/// Cloneable handle for publishing events onto the dispatch queue
///
/// Publishing never waits for handlers: a successful `publish` means the event
/// was accepted for later dispatch, not that it was handled.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    queue: mpsc::UnboundedSender<PublishedEvent>,
    state: watch::Receiver<DispatcherState>,
}

impl EventPublisher {
    pub(crate) fn new(
        queue: mpsc::UnboundedSender<PublishedEvent>,
        state: watch::Receiver<DispatcherState>,
    ) -> Self {
        Self { queue, state }
    }

    /// Publish an event with the given routing key and payload
    pub fn publish(&self, routing_key: &str, payload: Payload) -> Result<EventId> {
        let span = info_span!("publisher", routing_key = %routing_key);
        let _guard = span.enter();

        validate_routing_key(routing_key)?;

        let state = *self.state.borrow();
        if !state.is_accepting() {
            return Err(EventError::NotRunning { state });
        }

        let event = PublishedEvent::new(routing_key, payload);
        let event_id = event.id;
        if self.queue.send(event).is_err() {
            // Consumer closed the queue while we were checking state
            let state = *self.state.borrow();
            return Err(if state.is_accepting() {
                EventError::QueueClosed
            } else {
                EventError::NotRunning { state }
            });
        }

        debug!(event_id = %event_id, "Event accepted");
        Ok(event_id)
    }

    /// Serialize a model into a payload and publish it
    pub fn publish_model<T: Serialize + ?Sized>(
        &self,
        routing_key: &str,
        model: &T,
    ) -> Result<EventId> {
        let payload = Payload::from_model(model)?;
        self.publish(routing_key, payload)
    }

    /// Check if the dispatcher currently accepts publishes
    pub fn is_accepting(&self) -> bool {
        self.state.borrow().is_accepting()
    }
}

fn validate_routing_key(routing_key: &str) -> Result<()> {
    let reason = if routing_key.is_empty() {
        "routing key must not be empty"
    } else if routing_key.split('.').any(str::is_empty) {
        "routing key must not contain empty segments"
    } else if routing_key.split('.').any(|s| s == "*" || s == "#") {
        "routing key must not contain wildcards"
    } else {
        return Ok(());
    };

    Err(EventError::InvalidRoutingKey {
        routing_key: routing_key.to_string(),
        reason: reason.to_string(),
    })
}
