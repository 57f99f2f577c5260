//! Host Capabilities
//!
//! The narrow ports through which provisioners touch the machine:
//! - [`CommandRunner`]: external programs
//! - [`ServiceManager`]: init-system units
//! - [`HostFs`]: files, directories and ownership
//! - [`Host`]: hostname, interfaces and memory

pub mod fileio;
pub mod network;
pub mod runner;
pub mod systemd;

pub use fileio::*;
pub use network::*;
pub use runner::*;
pub use systemd::*;
