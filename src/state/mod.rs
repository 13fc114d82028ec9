//! State module for tracking queue progress
//!
//! `RequestState` is the lifecycle of a single URL inside a durable queue:
//! pending, in flight, and one of the terminal outcomes.

mod request_state;

pub use request_state::RequestState;
