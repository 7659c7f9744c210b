use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::analyzer::FaceAnalyzer;
use crate::face::Detection;

pub const DEFAULT_SIDECAR_SUFFIX: &str = ".faces.json";

/// Reads detections an external embedder has written next to each image.
///
/// For `dataset/alice/1.jpg` the detections live in
/// `dataset/alice/1.jpg.faces.json` as a JSON list. A missing sidecar means
/// the embedder found no face.
#[derive(Debug, Clone)]
pub struct SidecarAnalyzer {
    suffix: String,
}

impl SidecarAnalyzer {
    pub fn new() -> Self {
        Self::with_suffix(DEFAULT_SIDECAR_SUFFIX)
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn sidecar_path(&self, image: &Path) -> PathBuf {
        let mut name = image
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(&self.suffix);
        image.with_file_name(name)
    }
}

impl Default for SidecarAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceAnalyzer for SidecarAnalyzer {
    fn analyze(&mut self, image: &Path) -> Result<Vec<Detection>> {
        let sidecar = self.sidecar_path(image);
        if !sidecar.exists() {
            log::debug!("no detections recorded for {}", image.display());
            return Ok(vec![]);
        }

        let raw = std::fs::read_to_string(&sidecar)
            .with_context(|| format!("reading {}", sidecar.display()))?;
        let detections: Vec<Detection> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing detections {}", sidecar.display()))?;
        log::debug!(
            "{}: {} face(s) from {}",
            image.display(),
            detections.len(),
            sidecar.display()
        );
        Ok(detections)
    }
}
