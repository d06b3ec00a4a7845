//! HTTP adapter for the stockbook cloud row store.
//!
//! Implements the core `RemoteStore` capability against the cloud service's
//! REST row endpoints.

mod client;
mod error;

pub use client::{ConnectConfig, HttpRemoteStore};
pub use error::{ConnectError, ConnectRetryClass, Result};
