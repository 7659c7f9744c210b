use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::warn;
use std::path::{Path, PathBuf};

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// Raw source images grouped by identity name.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    identities: IndexMap<String, Vec<PathBuf>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `<dir>/<identity>/<image>`.
    ///
    /// Identities and images are sorted by name. A missing `dir` is an empty
    /// corpus; loose files in `dir` are ignored.
    pub fn scan(dir: &Path, extensions: &[String]) -> Result<Self> {
        let mut corpus = Self::new();
        if !dir.exists() {
            return Ok(corpus);
        }

        let mut people = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => people.push((name, entry.path())),
                Err(name) => warn!("skipping non UTF-8 identity directory {:?}", name),
            }
        }
        people.sort();

        for (name, path) in people {
            let mut images = Vec::new();
            for entry in std::fs::read_dir(&path)
                .with_context(|| format!("reading {}", path.display()))?
            {
                let entry = entry?;
                let image = entry.path();
                if entry.file_type()?.is_file() && is_image(&image, extensions) {
                    images.push(image);
                }
            }
            images.sort();
            corpus.identities.insert(name, images);
        }

        Ok(corpus)
    }

    pub fn insert(&mut self, name: impl Into<String>, images: Vec<PathBuf>) {
        self.identities.insert(name.into(), images);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn images(&self, name: &str) -> Option<&[PathBuf]> {
        self.identities.get(name).map(Vec::as_slice)
    }

    pub fn image_count(&self, name: &str) -> usize {
        self.images(name).map_or(0, <[PathBuf]>::len)
    }

    pub fn identities(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.identities
            .iter()
            .map(|(name, images)| (name.as_str(), images.as_slice()))
    }
}

pub fn default_extensions() -> Vec<String> {
    DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Case-insensitive extension check.
pub fn is_image(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}
