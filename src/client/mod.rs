//! Storage API Client
//!
//! Connection configuration and the `reqwest` adapter for the
//! [`StorageApi`](crate::domain::ports::StorageApi) port.

pub mod config;
pub mod rest;

pub use config::*;
pub use rest::*;
