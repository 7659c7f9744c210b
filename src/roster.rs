use indexmap::IndexMap;
use ndarray::Array2;
use once_cell::sync::OnceCell;
use rollcall_vision::{face, Embedding};

use crate::error::{Result, StoreError};

/// Immutable `name -> representative embedding` mapping shared with readers.
///
/// Iteration order is insertion order; overwriting an existing name keeps
/// its position. Every embedding has the same dimension.
#[derive(Debug, Default)]
pub struct Roster {
    entries: IndexMap<String, Embedding>,
    // stacked rows of `entries`, built on first match
    gallery: OnceCell<Array2<f32>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by all embeddings, `None` while empty.
    pub fn dim(&self) -> Option<usize> {
        self.entries.values().next().map(Embedding::dim)
    }

    pub fn get(&self, name: &str) -> Option<&Embedding> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.entries.get_index(index).map(|(name, _)| name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.entries.iter().map(|(name, emb)| (name.as_str(), emb))
    }

    /// Insert or overwrite `name`, returning the previous embedding.
    pub fn insert(&mut self, name: String, embedding: Embedding) -> Result<Option<Embedding>> {
        validate_name(&name)?;
        if embedding.dim() == 0 {
            return Err(StoreError::EmptyEmbedding(name));
        }
        if let Some(want) = self.dim() {
            if embedding.dim() != want {
                return Err(StoreError::DimensionMismatch {
                    got: embedding.dim(),
                    want,
                });
            }
        }
        self.gallery = OnceCell::new();
        Ok(self.entries.insert(name, embedding))
    }

    /// All embeddings stacked as an `N x D` matrix in iteration order.
    pub fn gallery(&self) -> Option<&Array2<f32>> {
        if self.entries.is_empty() {
            return None;
        }
        self.gallery
            .get_or_try_init(|| face::stack_embeddings(self.entries.values()))
            .map_err(|e| log::warn!("cannot build gallery matrix: {e:#}"))
            .ok()
    }
}

impl Clone for Roster {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            gallery: OnceCell::new(),
        }
    }
}

impl PartialEq for Roster {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<S: Into<String>> FromIterator<(S, Embedding)> for Roster {
    fn from_iter<I: IntoIterator<Item = (S, Embedding)>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for (name, embedding) in iter {
            let name = name.into();
            if let Err(e) = roster.insert(name.clone(), embedding) {
                log::warn!("skipping identity {name:?}: {e}");
            }
        }
        roster
    }
}

/// Identity names double as dataset directory names.
pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
