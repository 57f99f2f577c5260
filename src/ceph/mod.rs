//! Ceph Primitives
//!
//! Everything the ceph backends share: on-disk layout, keyrings, the cluster
//! config file, and the `ceph` CLI facade with its status probes.

pub mod cli;
pub mod conf;
pub mod keyring;
pub mod layout;

pub use cli::*;
pub use conf::*;
pub use keyring::*;
pub use layout::*;
