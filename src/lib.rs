#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Papa Events
//!
//! In-process publish/subscribe event dispatcher.
//!
//! ## Overview
//!
//! Application code registers asynchronous handlers against one or more
//! routing-key patterns and a unique use-case identifier. Other code publishes
//! events under a concrete routing key. The dispatcher matches the key against
//! the registered patterns and invokes every matching handler with the event
//! payload, and with the routing key itself when the handler declares a text
//! parameter for it.
//!
//! ## Key Features
//!
//! - **Registration-time validation**: a handler's parameters are inspected
//!   once into a binding plan; bad signatures never reach dispatch
//! - **Topic routing**: exact keys plus `*` (one segment) and `#` (zero or
//!   more segments) wildcards
//! - **Failure isolation**: handler errors, panics, and timeouts are contained
//!   per invocation and reported as outcomes and dead letters
//! - **Bounded concurrency**: at most `max_jobs` invocations in flight
//! - **Graceful drain**: `stop` finishes queued and in-flight work within the
//!   drain timeout
//!
//! ## Module Organization
//!
//! - [`application`] - The [`EventApp`] context object and handler registration
//! - [`registry`] - Signature inspection, routing patterns, handler registry
//! - [`dispatch`] - Handler trait, consumer loop, lifecycle, dead letters
//! - [`events`] - Payloads, published events, outcomes, the publisher handle
//! - [`config`] - Layered dispatcher configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! Delivery is at-most-once and in-memory only: events still queued or in
//! flight when the process exits are lost.

pub mod application;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod registry;

pub use application::{AppStats, EventApp, Registration};
pub use config::DispatcherConfig;
pub use dispatch::{
    DeadLetterStore, DispatcherState, DrainReport, EventHandler, FnHandler, HandlerArgs,
    HandlerError,
};
pub use error::{EventError, Result};
pub use events::{DeadLetter, DispatchOutcome, EventId, EventPublisher, Payload, PayloadError};
pub use registry::{BindingPlan, HandlerSignature, RoutingPattern, SignatureError};

// Re-exported for implementing EventHandler without a direct dependency
pub use async_trait::async_trait;
