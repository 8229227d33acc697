//! # courant-queue
//!
//! Durable FIFO of outbound chat actions.
//!
//! Actions accumulate while the connection is down and are replayed in
//! strict order once it comes back.  The queue is persisted in its own
//! SQLite file, independently of the message cache: a process restart
//! resumes draining from exactly where it stopped, with no action lost and
//! none duplicated in the persisted queue itself.  Transmission is
//! at-least-once; the wire protocol is idempotent by message id.

pub mod models;
pub mod queue;

mod error;

pub use error::QueueError;
pub use models::PendingAction;
pub use queue::ActionQueue;
