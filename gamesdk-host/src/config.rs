//! Loader configuration.
//!
//! Optional TOML file at `~/.config/gamesdk/host.toml`, overridable from the
//! environment (`GAMESDK_RESOURCE_DIR`, `GAMESDK_TEMP_DIR`, `GAMESDK_SDK_PATH`,
//! `GAMESDK_SDK_URL`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::platform::{ArchConvention, BINDING_LIBRARY, SDK_LIBRARY};

/// Vendor SDK archive fetched by [`crate::Loader::load_download`].
pub const DEFAULT_SDK_ARCHIVE_URL: &str =
    "https://dl-game-sdk.discordapp.net/2.5.6/discord_game_sdk.zip";

/// Identifying client string sent with every download.
pub const DEFAULT_USER_AGENT: &str = concat!("gamesdk-host/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base name of the binding object (`lib{name}.so`, `{name}.dll`, ...).
    pub binding_name: String,
    /// Base name of the vendor SDK object.
    pub sdk_name: String,
    /// Root of the bundled resources. Default: `resources/` beside the executable.
    pub resource_dir: Option<PathBuf>,
    /// Where staging directories are created. Default: the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Name prefix of staging directories.
    pub temp_prefix: String,
    /// Vendor SDK already on disk; passed to bootstrap and pre-loaded on Windows.
    pub sdk_path: Option<PathBuf>,
    pub sdk_archive_url: String,
    pub user_agent: String,
    pub download_timeout_secs: u64,
    /// Arch convention for `/native/{os}/{arch}/...`.
    pub binding_arch: ArchConvention,
    /// Arch convention for `lib/{arch}/...` inside the vendor archive.
    pub archive_arch: ArchConvention,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            binding_name: BINDING_LIBRARY.to_string(),
            sdk_name: SDK_LIBRARY.to_string(),
            resource_dir: None,
            temp_dir: None,
            temp_prefix: "gamesdk-host".to_string(),
            sdk_path: None,
            sdk_archive_url: DEFAULT_SDK_ARCHIVE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_timeout_secs: 60,
            binding_arch: ArchConvention::Normalized,
            archive_arch: ArchConvention::Vendor,
        }
    }
}

impl LoaderConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gamesdk").join("host.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Defaults, then the default config file if present, then the environment.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(dir) = non_empty("GAMESDK_RESOURCE_DIR") {
            self.resource_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty("GAMESDK_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = non_empty("GAMESDK_SDK_PATH") {
            self.sdk_path = Some(PathBuf::from(path));
        }
        if let Some(url) = non_empty("GAMESDK_SDK_URL") {
            self.sdk_archive_url = url;
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
