//! HTTP/1.1 wire records and codec.
//!
//! The proxy speaks exactly one request/response exchange per connection, so
//! the codec here is deliberately small: it parses whatever one non-blocking
//! read produced into a structured record and serializes records back to
//! their wire form.
//!
//! - **`headers`**: insertion-ordered header map (case-sensitive names,
//!   last-write-wins)
//! - **`request`** / **`response`**: the structured records plus their
//!   serialization
//! - **`parser`**: parsing of requests and status-line responses out of a
//!   byte buffer

pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
