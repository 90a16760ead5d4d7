//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReelError, ReelResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for job-scoped scratch files and local outputs.
    pub work_dir: PathBuf,

    /// External encoder settings.
    pub encoder: EncoderConfig,

    /// Glyph-image provider settings.
    pub glyphs: GlyphConfig,

    /// Fonts used for text layers.
    pub fonts: FontConfig,

    /// Remote object storage. `None` keeps outputs local.
    pub storage: Option<StorageConfig>,

    /// URL prefix reported for outputs that stay on local disk.
    pub local_url_prefix: String,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Encoder discovery and quality settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Explicit ffmpeg locations, tried in order after the `PATH` lookup.
    pub ffmpeg_candidates: Vec<PathBuf>,

    /// Explicit ffprobe binary. Defaults to the sibling of the resolved ffmpeg.
    pub ffprobe: Option<PathBuf>,

    /// x264 preset.
    pub preset: String,

    /// x264 constant rate factor.
    pub crf: u32,

    /// Library directories prepended to `LD_LIBRARY_PATH` for encoder
    /// child processes (buildpack installs ship their own shared objects).
    pub extra_library_paths: Vec<PathBuf>,
}

/// Where glyph images come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlyphConfig {
    /// Base URL; the glyph code and `.png` are appended.
    pub base_url: String,

    /// Retry without `fe0f` variation selectors when the exact code misses.
    pub strip_variation_selector_fallback: bool,
}

/// Font selection for text layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// fontconfig family for normal weight.
    pub regular_family: String,

    /// fontconfig pattern for bold weight.
    pub bold_family: String,

    /// Explicit font file for normal weight; wins over the family.
    pub regular_file: Option<PathBuf>,

    /// Explicit font file for bold weight; wins over the family.
    pub bold_file: Option<PathBuf>,
}

/// Remote object storage reachable by HTTP PUT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL objects are PUT to (`<upload_base_url>/<key>`).
    pub upload_base_url: String,

    /// Base URL objects are publicly served from.
    pub public_base_url: String,

    /// Optional bearer token sent with uploads.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Key prefix for rendered videos.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Request a public-read ACL.
    #[serde(default = "default_public_read")]
    pub public_read: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelsmith=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("reelsmith"),
            encoder: EncoderConfig::default(),
            glyphs: GlyphConfig::default(),
            fonts: FontConfig::default(),
            storage: None,
            local_url_prefix: "/videos".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_candidates: [
                "/usr/bin/ffmpeg",
                "/usr/local/bin/ffmpeg",
                "/opt/homebrew/bin/ffmpeg",
                "/layers/digitalocean_apt/apt/usr/bin/ffmpeg",
                "/app/.apt/usr/bin/ffmpeg",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            ffprobe: None,
            preset: "medium".to_string(),
            crf: 23,
            extra_library_paths: vec![],
        }
    }
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cdn.jsdelivr.net/gh/twitter/twemoji@latest/assets/72x72"
                .to_string(),
            strip_variation_selector_fallback: true,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            regular_family: "Liberation Sans".to_string(),
            bold_family: "Liberation Sans:style=Bold".to_string(),
            regular_file: None,
            bold_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

fn default_key_prefix() -> String {
    "videos".to_string()
}

fn default_public_read() -> bool {
    true
}

impl StorageConfig {
    /// Build storage settings from `REELSMITH_STORAGE_*` variables.
    ///
    /// Returns `None` unless both the upload and public URLs are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Some(Self {
            upload_base_url: non_empty("REELSMITH_STORAGE_UPLOAD_URL")?,
            public_base_url: non_empty("REELSMITH_STORAGE_PUBLIC_URL")?,
            auth_token: non_empty("REELSMITH_STORAGE_TOKEN"),
            key_prefix: default_key_prefix(),
            public_read: default_public_read(),
        })
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    ///
    /// Storage settings found in the environment override the file.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = if config_path.exists() {
            match Self::read_file(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.override_storage(StorageConfig::from_env());
        config
    }

    /// Load config from an explicit path. Errors are not swallowed.
    ///
    /// Storage settings found in the environment override the file, as in
    /// [`AppConfig::load`].
    pub fn load_from(path: impl AsRef<Path>) -> ReelResult<Self> {
        Self::load_from_with(path.as_ref(), |key| std::env::var(key).ok())
    }

    fn load_from_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> ReelResult<Self> {
        let mut config = Self::read_file(path)?;
        config.override_storage(StorageConfig::from_lookup(lookup));
        Ok(config)
    }

    fn read_file(path: &Path) -> ReelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReelError::config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    fn override_storage(&mut self, storage: Option<StorageConfig>) {
        if let Some(storage) = storage {
            self.storage = Some(storage);
        }
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelsmith").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_keep_storage_unconfigured() {
        let config = AppConfig::default();
        assert!(config.storage.is_none());
        assert_eq!(config.encoder.crf, 23);
        assert_eq!(config.local_url_prefix, "/videos");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "encoder": { "preset": "veryfast" } }"#).unwrap();
        assert_eq!(config.encoder.preset, "veryfast");
        assert_eq!(config.encoder.crf, 23);
        assert!(!config.encoder.ffmpeg_candidates.is_empty());
        assert_eq!(config.fonts.regular_family, "Liberation Sans");
    }

    #[test]
    fn test_storage_from_lookup_requires_both_urls() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("REELSMITH_STORAGE_UPLOAD_URL", "https://up.example")]);
        let storage = StorageConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(storage.is_none());

        let vars: HashMap<&str, &str> = HashMap::from([
            ("REELSMITH_STORAGE_UPLOAD_URL", "https://up.example"),
            ("REELSMITH_STORAGE_PUBLIC_URL", "https://cdn.example"),
            ("REELSMITH_STORAGE_TOKEN", ""),
        ]);
        let storage = StorageConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(storage.public_base_url, "https://cdn.example");
        assert_eq!(storage.key_prefix, "videos");
        assert!(storage.auth_token.is_none());
        assert!(storage.public_read);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.encoder.preset = "fast".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.encoder.preset, "fast");
    }

    #[test]
    fn test_explicit_path_honours_storage_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        AppConfig::default().save_to(&path).unwrap();

        let vars: HashMap<&str, &str> = HashMap::from([
            ("REELSMITH_STORAGE_UPLOAD_URL", "https://up.example"),
            ("REELSMITH_STORAGE_PUBLIC_URL", "https://cdn.example"),
        ]);
        let config =
            AppConfig::load_from_with(&path, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        let storage = config.storage.unwrap();
        assert_eq!(storage.upload_base_url, "https://up.example");

        let config = AppConfig::load_from_with(&path, |_| None).unwrap();
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ReelError::Config { .. }));
    }
}
