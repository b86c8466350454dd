#![allow(dead_code)]

use papa_events::{
    async_trait, DispatchOutcome, DispatcherConfig, EventApp, EventHandler, HandlerArgs,
    HandlerError, HandlerSignature, Payload,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;

/// One observed handler invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub routing_key: Option<String>,
    pub payload: Value,
}

/// Handler that records every invocation it receives
pub struct RecordingHandler {
    signature: HandlerSignature,
    calls: Mutex<Vec<Call>>,
}

impl RecordingHandler {
    pub fn new(signature: HandlerSignature) -> Self {
        Self {
            signature,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Handler declared as `(event: Payload)`
    pub fn payload_only() -> Self {
        Self::new(HandlerSignature::new().payload("event"))
    }

    /// Handler declared as `(<text_param>: str, event: Payload)`
    pub fn with_text(text_param: &str) -> Self {
        Self::new(HandlerSignature::new().text(text_param).payload("event"))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn signature(&self) -> HandlerSignature {
        self.signature.clone()
    }

    async fn handle(&self, args: HandlerArgs) -> Result<(), HandlerError> {
        self.calls.lock().push(Call {
            routing_key: args.routing_key().map(str::to_string),
            payload: args.payload().to_value(),
        });
        Ok(())
    }
}

/// App with a short retry delay so retry tests stay fast
pub fn test_app() -> EventApp {
    EventApp::with_config(DispatcherConfig {
        retry_delay_ms: 5,
        drain_timeout_ms: 5_000,
        ..DispatcherConfig::default()
    })
    .expect("test config is valid")
}

pub fn payload(value: Value) -> Payload {
    Payload::try_from(value).expect("test payload is an object")
}

/// Wait for `count` outcomes, failing the test after a generous timeout
pub async fn collect_outcomes(
    outcomes: &mut broadcast::Receiver<DispatchOutcome>,
    count: usize,
) -> Vec<DispatchOutcome> {
    let mut collected = Vec::with_capacity(count);
    while collected.len() < count {
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("timed out waiting for dispatch outcome")
            .expect("outcome channel closed");
        collected.push(outcome);
    }
    collected
}
