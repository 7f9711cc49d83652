//! Relay core: topic routing, the per-message pipeline, the poll loop, and
//! in-flight/shutdown coordination.

pub mod message;
pub mod routing;
pub mod scheduler;
pub mod shutdown;
