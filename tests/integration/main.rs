//! Integration tests module
//!
//! End-to-end tests that run a full monitor over recorded or in-memory
//! audit streams

#[path = "../helpers/mod.rs"]
mod helpers;

mod test_backpressure;
mod test_retention;
mod test_trail_replay;
