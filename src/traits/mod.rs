//! Seams to the collaborators this engine does not own
//!
//! The remote record store and the sink for dropped updates are supplied by
//! the embedding application.

mod error_sink;
mod persistence;

pub use error_sink::{ErrorSink, TracingErrorSink};
pub use persistence::RemotePersistence;
