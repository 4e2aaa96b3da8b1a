//! Domain layer - remote records and the storage API port
//!
//! This module defines the trait (port) the REST adapter implements and the
//! typed records it returns.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
