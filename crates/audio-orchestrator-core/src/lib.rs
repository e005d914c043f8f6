//! The orchestrator state machine and alignment, with no I/O of its own.
//!
//! Every side effect — publish, store, persist — goes through the `Broker`,
//! `ObjectStore`, and `JobStateStore` traits in [`traits`], so the handlers in
//! [`handlers`] are exercisable against in-memory fakes without a broker, an
//! object store, or Redis. Concrete adapters live in `apps/orchestrator`.

mod error;
mod handlers;
mod traits;

pub use audio_schemas::{AUDIO_EVENTS, AUDIO_OPS, MEDIA_EVENTS, WORKER_EVENTS};
pub use error::{OrchestratorError, Result};
pub use handlers::Orchestrator;
pub use traits::{Broker, JobStateStore, ObjectStore};

#[cfg(test)]
mod tests;
