//! Non-blocking socket plumbing.
//!
//! - **`sock`**: socket creation, listener setup, and the non-blocking
//!   upstream connect
//! - **`poller`**: the readiness multiplexer the reactor blocks in

pub mod poller;
pub mod sock;
