//! Building blocks for cdflow2 config containers.
//!
//! A config container implements [`Handler`] and calls [`listen`]. The host
//! talks to it through the `config-forward` binary, which relays one JSON
//! request from stdin to the container's Unix socket and the response back to
//! stdout. Handlers use [`release::ReleaseSaver`] and
//! [`release::ReleaseLoader`] to move release directories in and out of zip
//! archives.

pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod release;
pub mod server;
pub mod transport;

pub use config::ListenerConfig;
pub use error::{Error, Result};
pub use handler::Handler;
pub use server::{listen, Dispatcher, Listener};
pub use transport::forward;
