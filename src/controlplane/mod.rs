//! Control Plane Module
//!
//! Backend registries, the provisioners they build, readiness polling, and
//! the orchestrator that sequences cluster bootstrap and teardown.

pub mod backends;
pub mod orchestrator;
pub mod poll;
pub mod registry;

pub use backends::*;
pub use orchestrator::*;
pub use poll::*;
pub use registry::*;
