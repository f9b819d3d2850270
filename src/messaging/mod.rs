//! # Messaging Module
//!
//! Results queue plumbing: the worker report format, the transport traits the
//! sync service consumes, and the pgmq-backed implementation.

pub mod errors;
pub mod message;
pub mod pgmq_client;
pub mod traits;

pub use errors::{MessagingError, MessagingResult};
pub use message::{HintResult, QueuedResult, ResultMessage, ResultPayload};
pub use pgmq_client::PgmqResultQueue;
pub use traits::{BatchHandler, ResultQueue};
