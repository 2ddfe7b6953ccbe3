//! Listener configuration.

use std::path::PathBuf;

/// Socket path used when the host does not supply one.
pub const DEFAULT_SOCKET_PATH: &str = "/sock";

/// Where the host mounts the release directory inside the config container.
pub const DEFAULT_RELEASE_DIR: &str = "/release";

/// Overrides [`DEFAULT_SOCKET_PATH`].
pub const SOCKET_PATH_ENV: &str = "CDFLOW2_CONFIG_SOCKET";

/// Overrides [`DEFAULT_RELEASE_DIR`].
pub const RELEASE_DIR_ENV: &str = "CDFLOW2_RELEASE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Unix socket to listen on. Parent directories are created on bind.
    pub socket_path: PathBuf,
    /// Release directory handed to `upload_release` and `prepare_terraform`.
    pub release_dir: PathBuf,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            release_dir: PathBuf::from(DEFAULT_RELEASE_DIR),
        }
    }
}

impl ListenerConfig {
    /// Empty paths fall back to the defaults.
    pub fn new(socket_path: impl Into<PathBuf>, release_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        let socket_path = socket_path.into();
        if !socket_path.as_os_str().is_empty() {
            config.socket_path = socket_path;
        }
        let release_dir = release_dir.into();
        if !release_dir.as_os_str().is_empty() {
            config.release_dir = release_dir;
        }
        config
    }

    /// Defaults, overridden by `CDFLOW2_CONFIG_SOCKET` and `CDFLOW2_RELEASE_DIR`.
    /// Empty values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup(SOCKET_PATH_ENV).filter(|v| !v.is_empty()) {
            config.socket_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(RELEASE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.release_dir = PathBuf::from(dir);
        }
        config
    }
}
