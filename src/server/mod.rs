//! The single-threaded reactor driving every proxy session.

pub mod reactor;

pub use reactor::Server;
