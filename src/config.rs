use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use seek_embed::EmbedConfig;
use seek_index::{IndexerConfig, StoreConfig};

/// Top-level `seek.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Disables indexing and search entirely when false.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub embed: EmbedConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexerConfig,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            embed: EmbedConfig::default(),
            store: StoreConfig::default(),
            index: IndexerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist, then apply `SEEK_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embed.batch_size == 0 {
            bail!("embed.batch_size must be at least 1");
        }
        if self.embed.queue_capacity == 0 {
            bail!("embed.queue_capacity must be at least 1");
        }
        self.store.validate()?;
        self.index.validate()?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEEK_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SEEK_EMBED_MODEL") {
            self.embed.model = v;
        }
        if let Ok(v) = std::env::var("SEEK_EMBED_MODEL_PATH") {
            self.embed.model_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEEK_EMBED_DEVICE") {
            match v.parse() {
                Ok(device) => self.embed.device = device,
                Err(e) => tracing::warn!("ignoring invalid SEEK_EMBED_DEVICE value: {e}"),
            }
        }
        if let Ok(v) = std::env::var("SEEK_EMBED_QUANTIZATION") {
            match v.parse() {
                Ok(quantization) => self.embed.quantization = quantization,
                Err(e) => tracing::warn!("ignoring invalid SEEK_EMBED_QUANTIZATION value: {e}"),
            }
        }
        if let Ok(v) = std::env::var("SEEK_EMBED_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embed.batch_size = n;
        }
        if let Ok(v) = std::env::var("SEEK_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("SEEK_COLLECTION") {
            self.store.collection = v;
        }
        if let Ok(v) = std::env::var("SEEK_INDEX_WORKERS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.workers = n;
        }
        if let Ok(v) = std::env::var("SEEK_INDEX_STATE_PATH") {
            self.index.state_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEEK_INDEX_DEFAULT_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.index.default_k = k;
        }
        if let Ok(v) = std::env::var("SEEK_INDEX_SCORE_THRESHOLD")
            && let Ok(threshold) = v.parse::<f32>()
        {
            self.index.score_threshold = threshold;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use seek_embed::{DeviceSpec, Quantization};
    use serial_test::serial;

    use super::*;

    const ENV_KEYS: [&str; 12] = [
        "SEEK_ENABLED",
        "SEEK_EMBED_MODEL",
        "SEEK_EMBED_MODEL_PATH",
        "SEEK_EMBED_DEVICE",
        "SEEK_EMBED_QUANTIZATION",
        "SEEK_EMBED_BATCH_SIZE",
        "SEEK_QDRANT_URL",
        "SEEK_COLLECTION",
        "SEEK_INDEX_WORKERS",
        "SEEK_INDEX_STATE_PATH",
        "SEEK_INDEX_DEFAULT_K",
        "SEEK_INDEX_SCORE_THRESHOLD",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_when_file_missing() {
        clear_env();
        let config = Config::load(Path::new("/nonexistent/seek.toml")).unwrap();
        assert!(config.enabled);
        assert_eq!(config.store.qdrant_url, "http://localhost:6334");
        assert_eq!(config.embed.device, DeviceSpec::Auto);
        assert_eq!(config.index.workers, 4);
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn parse_valid_toml() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[embed]
model = "intfloat/e5-small-v2"
device = "cuda:1"
quantization = "f16"
batch_size = 16

[store]
collection = "project_chunks"
quantize_vectors = false

[index]
workers = 8
state_path = ".seek/state.db"

[index.chunker]
window_lines = 30
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.embed.model, "intfloat/e5-small-v2");
        assert_eq!(config.embed.device, DeviceSpec::Cuda(1));
        assert_eq!(config.embed.quantization, Quantization::F16);
        assert_eq!(config.embed.batch_size, 16);
        assert_eq!(config.store.collection, "project_chunks");
        assert!(!config.store.quantize_vectors);
        assert_eq!(config.index.workers, 8);
        assert_eq!(
            config.index.state_path.as_deref(),
            Some(Path::new(".seek/state.db"))
        );
        assert_eq!(config.index.chunker.window_lines, 30);
        assert_eq!(config.index.chunker.window_overlap, 0);
    }

    #[test]
    #[serial]
    fn invalid_device_in_file_is_an_error() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[embed]\ndevice = \"tpu\"\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn env_overrides() {
        clear_env();
        let mut config = Config::default();

        unsafe {
            std::env::set_var("SEEK_EMBED_DEVICE", "metal");
            std::env::set_var("SEEK_QDRANT_URL", "http://qdrant:6334");
            std::env::set_var("SEEK_INDEX_WORKERS", "2");
            std::env::set_var("SEEK_ENABLED", "false");
        }
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.embed.device, DeviceSpec::Metal(0));
        assert_eq!(config.store.qdrant_url, "http://qdrant:6334");
        assert_eq!(config.index.workers, 2);
        assert!(!config.enabled);
    }

    #[test]
    #[serial]
    fn invalid_env_values_ignored() {
        clear_env();
        let mut config = Config::default();

        unsafe {
            std::env::set_var("SEEK_EMBED_DEVICE", "quantum");
            std::env::set_var("SEEK_INDEX_WORKERS", "many");
        }
        config.apply_env_overrides();
        clear_env();

        assert_eq!(config.embed.device, DeviceSpec::Auto);
        assert_eq!(config.index.workers, 4);
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.embed.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.chunker.window_overlap = config.index.chunker.window_lines;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window_overlap"));
    }
}
