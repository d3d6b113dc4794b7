//! Daemon status checking
//!
//! The daemon owns the keyring and proxies every registry request. The
//! client only needs to know whether its socket is there before dialing.

use crate::paths::Paths;
use std::path::Path;

/// Status of the local daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running,
    Stopped,
    /// Something other than a socket sits at the socket path
    Error,
}

impl DaemonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// Check the daemon socket under the standard runtime directory
pub fn check_daemon(paths: &Paths) -> DaemonStatus {
    check_socket(&paths.socket())
}

/// Check an explicit socket path
pub fn check_socket(socket: &Path) -> DaemonStatus {
    match std::fs::metadata(socket) {
        Ok(meta) if is_socket(&meta) => DaemonStatus::Running,
        Ok(_) => DaemonStatus::Error,
        Err(_) => DaemonStatus::Stopped,
    }
}

#[cfg(unix)]
fn is_socket(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_socket()
}

#[cfg(not(unix))]
fn is_socket(_meta: &std::fs::Metadata) -> bool {
    false
}
