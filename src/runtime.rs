//! Runtime glue that wires configs, fatal error capture, liveness, telemetry,
//! and the relay entry points.

pub mod config;
pub mod fatal;
pub mod liveness;
pub mod runner;
pub mod telemetry;
