//! Standard paths used by strongbox tools

use std::path::PathBuf;

/// Name of the local daemon, also used for its runtime directory
pub const DAEMON_NAME: &str = "strongbox";

/// Standard strongbox paths
pub struct Paths {
    /// Data directory (~/.local/share/strongbox)
    pub data: PathBuf,
    /// Config directory (~/.config/strongbox)
    pub config: PathBuf,
    /// Runtime directory ($XDG_RUNTIME_DIR/strongbox or the data dir)
    pub runtime: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("strongbox");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("strongbox");

        let runtime = dirs::runtime_dir()
            .map(|dir| dir.join("strongbox"))
            .unwrap_or_else(|| data.clone());

        Self {
            data,
            config,
            runtime,
        }
    }

    /// Paths rooted somewhere other than the user's home (tests, sandboxes)
    pub fn rooted(root: &std::path::Path) -> Self {
        Self {
            data: root.join("data"),
            config: root.join("config"),
            runtime: root.join("run"),
        }
    }

    /// Socket the local daemon listens on
    pub fn socket(&self) -> PathBuf {
        self.runtime.join(format!("{}.sock", DAEMON_NAME))
    }

    /// Global configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.yaml")
    }
}
