pub mod payload;
pub mod publisher;
pub mod types;

pub use payload::{Payload, PayloadError};
pub use publisher::EventPublisher;
pub use types::{DeadLetter, DispatchOutcome, EventId, PublishedEvent};
