//! # Registry
//!
//! Registration-time machinery: signature inspection, routing patterns, and
//! the handler registry the dispatch engine looks handlers up in.
//!
//! ## Architecture
//!
//! ```text
//! HandlerSignature ──inspect──> BindingPlan ─┐
//! pattern strings ──parse────> RoutingPattern ├──> HandlerRegistry
//! EventHandler ──────────────────────────────┘         │
//!                                                lookup(routing_key)
//! ```

pub mod handler_registry;
pub mod pattern;
pub mod signature;

pub use handler_registry::{HandlerEntry, HandlerRegistry, RegistryStats};
pub use pattern::{PatternError, RoutingPattern};
pub use signature::{BindingPlan, HandlerSignature, Param, ParamType, SignatureError};
