#[path = "../support/mod.rs"]
mod support;

mod processor;
mod scheduler;
