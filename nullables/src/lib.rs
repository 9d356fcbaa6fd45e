//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern from RsNano.
//! The pool reaches the outside world only through the
//! [`Network`](murmur_network::Network) trait. This crate provides an
//! implementation that:
//! - Never touches real sockets
//! - Connects instantly, or refuses instantly when nothing listens
//! - Records every dial so tests can assert on retry behaviour
//!
//! Usage: build a pool over a shared [`NullNetwork`] instead of `TcpNetwork`.

pub mod network;

pub use network::{NullListener, NullNetwork};
