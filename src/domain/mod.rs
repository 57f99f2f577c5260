//! Domain Module
//!
//! Core domain types and port definitions.

pub mod ports;

pub use ports::*;
