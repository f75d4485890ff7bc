//! Domain events
//!
//! - **`event`**: the [`DomainEvent`] enum and its envelope.
//! - **`bus`**: the in-process [`EventBus`] that fans events out to subscribers.

pub mod bus;
pub mod event;

pub use bus::{EventBus, DEFAULT_EVENT_BUFFER};
pub use event::{DomainEvent, EventEnvelope, EventId, ExecutionCompleted, JobCreated};
