//! # Dispatch
//!
//! Everything between the queue and the handlers: the handler trait and its
//! arguments, the consumer loop, the lifecycle state machine that starts and
//! drains it, and the store for events that could not be handled.
//!
//! ## Architecture
//!
//! ```text
//! EventPublisher ──mpsc──> DispatchEngine (single consumer, FIFO)
//!                                │ lookup(routing_key)
//!                                ▼
//!                     JoinSet of handler invocations (≤ max_jobs)
//!                                │
//!                 ┌──────────────┴──────────────┐
//!                 ▼                             ▼
//!     broadcast<DispatchOutcome>        DeadLetterStore
//! ```

pub mod dead_letter;
pub mod engine;
pub mod handler;
pub mod lifecycle;

pub use dead_letter::DeadLetterStore;
pub use engine::DrainReport;
pub use handler::{ArgValue, EventHandler, FnHandler, HandlerArgs, HandlerError};
pub use lifecycle::{DispatcherState, LifecycleAction, LifecycleController, LifecycleState};
