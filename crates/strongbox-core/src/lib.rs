//! strongbox core - shared functionality for the strongbox client tools
//!
//! Standard locations, layered configuration and daemon discovery. Nothing
//! in here talks to the registry.

pub mod config;
pub mod daemon;
pub mod paths;

pub use config::{AddressDefaults, Config, DirPrefs};
pub use daemon::DaemonStatus;
pub use paths::Paths;
