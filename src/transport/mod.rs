//! Host side of the config socket.

pub mod forwarder;

pub use forwarder::{connect, connect_with_retry, forward, CONNECT_ATTEMPTS, CONNECT_RETRY_INTERVAL};
