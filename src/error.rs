//! # Dispatcher Errors
//!
//! Structured error types for registration, publishing, and lifecycle control.
//! Handler-side failures live in [`crate::dispatch::HandlerError`]; they are
//! contained by the dispatch engine and never surface through this type.

use crate::dispatch::lifecycle::{DispatcherState, LifecycleAction};
use crate::events::payload::PayloadError;
use crate::registry::pattern::PatternError;
use crate::registry::signature::SignatureError;
use thiserror::Error;

/// Errors returned by the public dispatcher API
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Invalid handler signature for <{use_case}>: {source}")]
    InvalidSignature {
        use_case: String,
        #[source]
        source: SignatureError,
    },

    #[error("Duplicate functions for <{use_case}>")]
    DuplicateRegistration { use_case: String },

    #[error("Invalid registration for <{use_case}>: {reason}")]
    InvalidRegistration { use_case: String, reason: String },

    #[error("Invalid routing pattern for <{use_case}>: {source}")]
    InvalidPattern {
        use_case: String,
        #[source]
        source: PatternError,
    },

    #[error("Dispatcher is not running (state: {state})")]
    NotRunning { state: DispatcherState },

    #[error("Cannot {action} dispatcher while {from}")]
    InvalidLifecycleTransition {
        from: DispatcherState,
        action: LifecycleAction,
    },

    #[error("Invalid routing key '{routing_key}': {reason}")]
    InvalidRoutingKey { routing_key: String, reason: String },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Event queue is closed")]
    QueueClosed,
}

impl From<config::ConfigError> for EventError {
    fn from(err: config::ConfigError) -> Self {
        EventError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EventError>;
