//! Configuration management for Pairpost

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_THREADS_BASE_URL: &str = "https://graph.threads.net/v1.0";
pub const DEFAULT_CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub threads: ThreadsConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Locations of the JSON-backed user and schedule stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoresConfig {
    pub users_file: String,
    pub schedule_file: String,
    pub content_index: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            users_file: "~/.config/pairpost/users.json".to_string(),
            schedule_file: "~/.config/pairpost/schedule.json".to_string(),
            content_index: "~/.local/share/pairpost/content_index.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Holds one directory per user, each with one subfolder per post
    pub root: String,
    /// Holds one optional reply directory per user
    pub replies_root: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: "~/pairpost/image_pairs".to_string(),
            replies_root: "~/pairpost/replies".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    pub base_url: String,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_THREADS_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub base_url: String,
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub folder: Option<String>,
    pub watermark: WatermarkConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CLOUDINARY_BASE_URL.to_string(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: None,
            watermark: WatermarkConfig::default(),
        }
    }
}

/// Text overlay stamped onto uploaded images
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub font: String,
    pub size: u32,
    /// Cloudinary gravity, e.g. "south_east"
    pub position: String,
    /// 0-100
    pub opacity: u8,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            font: "Arial".to_string(),
            size: 40,
            position: "south_east".to_string(),
            opacity: 50,
        }
    }
}

/// Resolved Cloudinary credentials
#[derive(Debug, Clone)]
pub struct MediaCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

impl MediaConfig {
    /// Resolve credentials, preferring `CLOUDINARY_*` environment variables
    /// over values from the config file
    pub fn credentials(&self) -> Result<MediaCredentials> {
        let cloud_name = env_or("CLOUDINARY_CLOUD_NAME", &self.cloud_name)
            .ok_or_else(|| ConfigError::MissingField("media.cloud_name".to_string()))?;
        let api_key = env_or("CLOUDINARY_API_KEY", &self.api_key)
            .ok_or_else(|| ConfigError::MissingField("media.api_key".to_string()))?;
        let api_secret = env_or("CLOUDINARY_API_SECRET", &self.api_secret)
            .ok_or_else(|| ConfigError::MissingField("media.api_secret".to_string()))?;

        Ok(MediaCredentials {
            cloud_name,
            api_key,
            api_secret: SecretString::from(api_secret),
        })
    }
}

fn env_or(var: &str, fallback: &Option<String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| fallback.clone())
}

/// Processing delays and pacing between users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "duration_str")]
    pub post_ready_delay: Duration,
    #[serde(with = "duration_str")]
    pub carousel_item_delay: Duration,
    #[serde(with = "duration_str")]
    pub reply_ready_delay: Duration,
    #[serde(with = "duration_str")]
    pub pacing_min: Duration,
    #[serde(with = "duration_str")]
    pub pacing_max: Duration,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            post_ready_delay: Duration::from_secs(30),
            carousel_item_delay: Duration::from_secs(5),
            reply_ready_delay: Duration::from_secs(30),
            pacing_min: Duration::from_secs(60),
            pacing_max: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timing.pacing_min > self.timing.pacing_max {
            return Err(ConfigError::InvalidValue {
                field: "timing.pacing_min".to_string(),
                reason: format!(
                    "{} is greater than timing.pacing_max ({})",
                    humantime::format_duration(self.timing.pacing_min),
                    humantime::format_duration(self.timing.pacing_max)
                ),
            }
            .into());
        }

        if self.timing.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timing.poll_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.media.watermark.opacity > 100 {
            return Err(ConfigError::InvalidValue {
                field: "media.watermark.opacity".to_string(),
                reason: format!("{} is outside 0-100", self.media.watermark.opacity),
            }
            .into());
        }

        Ok(())
    }

    pub fn users_file(&self) -> PathBuf {
        expand_path(&self.stores.users_file)
    }

    pub fn schedule_file(&self) -> PathBuf {
        expand_path(&self.stores.schedule_file)
    }

    pub fn content_index_file(&self) -> PathBuf {
        expand_path(&self.stores.content_index)
    }

    pub fn content_root(&self) -> PathBuf {
        expand_path(&self.content.root)
    }

    pub fn replies_root(&self) -> PathBuf {
        expand_path(&self.content.replies_root)
    }
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PAIRPOST_CONFIG") {
        return Ok(expand_path(&path));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pairpost").join("config.toml"))
}

/// Human-readable durations ("30s", "10m") in config files
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
