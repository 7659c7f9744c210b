use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::corpus;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ROLLCALL_CONFIG_PATH").unwrap_or("/usr/local/etc/rollcall/config.toml"))
});

pub static DATA_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ROLLCALL_DATA_PREFIX").unwrap_or("/var/lib/rollcall"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum cosine similarity, exclusive, for a recognition to count.
    pub threshold: f32,
    /// `<dataset_dir>/<identity>/<image>`
    pub dataset_dir: PathBuf,
    pub embeddings_file: PathBuf,
    pub image_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            dataset_dir: DATA_PREFIX.join("dataset"),
            embeddings_file: DATA_PREFIX.join("embeddings.bin"),
            image_extensions: corpus::default_extensions(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("threshold {} is outside [-1, 1]", self.threshold);
        }
        if self.image_extensions.is_empty() {
            anyhow::bail!("image_extensions must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
