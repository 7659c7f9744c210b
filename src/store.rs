use log::{debug, info, warn};
use ndarray::Axis;
use parking_lot::{Mutex, RwLock};
use rollcall_vision::{face, Embedding, FaceAnalyzer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::corpus::Corpus;
use crate::error::{Result, StoreError};
use crate::roster::{self, Roster};
use crate::storage;

/// Owns the identity roster and its durable snapshot.
///
/// Readers take [`EmbeddingStore::snapshot`], an `Arc` to a roster that is
/// never mutated again. Writers (`load`, `save`, `rebuild`, `enroll`) are serialized
/// by one lock held across "compute the next roster, persist it, publish it".
pub struct EmbeddingStore {
    path: PathBuf,
    current: RwLock<Arc<Roster>>,
    writer: Mutex<()>,
}

/// Result of [`EmbeddingStore::enroll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollOutcome {
    /// A representative embedding was computed and published.
    pub computed: bool,
    /// The snapshot on disk reflects the new roster.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityReport {
    pub name: String,
    pub images: usize,
    pub usable: usize,
}

/// Result of [`EmbeddingStore::rebuild`].
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    #[serde(skip)]
    pub roster: Arc<Roster>,
    pub identities: Vec<IdentityReport>,
    pub total_embeddings: usize,
    pub persisted: bool,
}

impl EmbeddingStore {
    /// Empty store backed by the snapshot at `path`; nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(Roster::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current roster. Never observes a half-applied mutation.
    pub fn snapshot(&self) -> Arc<Roster> {
        Arc::clone(&self.current.read())
    }

    pub fn size(&self) -> usize {
        self.current.read().len()
    }

    /// Load the durable snapshot, failing softly.
    ///
    /// A missing, unreadable or corrupt snapshot is logged and yields an
    /// empty roster.
    pub fn load(&self) -> Arc<Roster> {
        let _guard = self.writer.lock();
        match self.load_locked() {
            Ok(Some(roster)) => roster,
            Ok(None) => self.snapshot(),
            Err(e) => {
                warn!("failed to load embeddings from {}: {}", self.path.display(), e);
                self.publish(Roster::new())
            }
        }
    }

    /// Load the durable snapshot, reporting why it could not be used.
    ///
    /// `Ok(None)` when no snapshot exists; the in-memory roster is then reset
    /// to empty. On error the in-memory roster is left as it was.
    pub fn try_load(&self) -> Result<Option<Arc<Roster>>> {
        let _guard = self.writer.lock();
        self.load_locked()
    }

    // caller holds `self.writer`
    fn load_locked(&self) -> Result<Option<Arc<Roster>>> {
        match storage::read_snapshot(&self.path)? {
            Some(roster) => {
                info!(
                    "Loaded {} precomputed embeddings from {}",
                    roster.len(),
                    self.path.display()
                );
                Ok(Some(self.publish(roster)))
            }
            None => {
                info!("No embeddings snapshot at {}", self.path.display());
                self.publish(Roster::new());
                Ok(None)
            }
        }
    }

    /// Replace the roster with `roster` and write it to the snapshot file,
    /// atomically replacing the previous one.
    ///
    /// Runs under the writer lock like `enroll` and `rebuild`. A failed write
    /// is returned but the in-memory roster keeps `roster`.
    pub fn save(&self, roster: &Roster) -> Result<()> {
        let _guard = self.writer.lock();
        self.publish(roster.clone());
        self.write_locked(roster)
    }

    /// Recompute the whole roster from `corpus`, discarding the previous one.
    ///
    /// Each image contributes the first face the analyzer reports; images
    /// without a face or that fail to analyze are skipped. Identities with no
    /// usable image are left out. The first usable embedding fixes the
    /// dimension; later embeddings of another dimension are skipped.
    pub fn rebuild<A>(&self, corpus: &Corpus, analyzer: &mut A) -> RebuildReport
    where
        A: FaceAnalyzer + ?Sized,
    {
        let _guard = self.writer.lock();
        info!("Recomputing embeddings for {} identities", corpus.len());

        let mut next = Roster::new();
        let mut identities = Vec::with_capacity(corpus.len());

        for (name, images) in corpus.identities() {
            let mut usable = Vec::new();
            for image in images {
                let Some(embedding) = first_face(analyzer, image) else {
                    continue;
                };
                let want = next.dim().or_else(|| usable.first().map(Embedding::dim));
                match want {
                    Some(want) if embedding.dim() != want => warn!(
                        "{}: embedding dimension {} does not match {}, skipping",
                        image.display(),
                        embedding.dim(),
                        want
                    ),
                    _ => usable.push(embedding),
                }
            }

            identities.push(IdentityReport {
                name: name.to_string(),
                images: images.len(),
                usable: usable.len(),
            });

            let Some(representative) = mean_embedding(&usable) else {
                warn!("No usable face for {} ({} images)", name, images.len());
                continue;
            };
            match next.insert(name.to_string(), representative) {
                Ok(_) => info!(
                    "Computed embedding for {} from {} of {} images",
                    name,
                    usable.len(),
                    images.len()
                ),
                Err(e) => warn!("skipping identity {:?}: {}", name, e),
            }
        }

        let persisted = self.persist(&next);
        let total_embeddings = next.len();
        let roster = self.publish(next);
        RebuildReport {
            roster,
            identities,
            total_embeddings,
            persisted,
        }
    }

    /// Set `name`'s representative embedding to the mean of `raw`.
    ///
    /// Any existing entry is overwritten, not blended. Empty `raw` computes
    /// nothing and leaves the store untouched. Embeddings whose dimension
    /// differs from each other or from the roster are rejected before
    /// averaging. The new roster is published even if persisting it fails.
    pub fn enroll(&self, name: &str, raw: &[Embedding]) -> Result<EnrollOutcome> {
        roster::validate_name(name)?;
        let _guard = self.writer.lock();

        let Some(first) = raw.first() else {
            debug!("nothing to enroll for {}", name);
            return Ok(EnrollOutcome {
                computed: false,
                persisted: false,
            });
        };
        if let Some(bad) = raw.iter().find(|e| e.dim() != first.dim()) {
            return Err(StoreError::DimensionMismatch {
                got: bad.dim(),
                want: first.dim(),
            });
        }
        let Some(representative) = mean_embedding(raw) else {
            return Err(StoreError::EmptyEmbedding(name.to_string()));
        };

        let mut next = Roster::clone(&self.current.read());
        let replaced = next.insert(name.to_string(), representative)?.is_some();
        info!(
            "{} {} from {} embedding(s)",
            if replaced { "Re-enrolled" } else { "Enrolled" },
            name,
            raw.len()
        );

        let persisted = self.persist(&next);
        self.publish(next);
        Ok(EnrollOutcome {
            computed: true,
            persisted,
        })
    }

    fn persist(&self, roster: &Roster) -> bool {
        match self.write_locked(roster) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error saving embeddings: {}", e);
                false
            }
        }
    }

    // caller holds `self.writer`
    fn write_locked(&self, roster: &Roster) -> Result<()> {
        storage::write_snapshot(&self.path, roster)?;
        info!(
            "Saved {} embeddings to {}",
            roster.len(),
            self.path.display()
        );
        Ok(())
    }

    fn publish(&self, roster: Roster) -> Arc<Roster> {
        let roster = Arc::new(roster);
        *self.current.write() = Arc::clone(&roster);
        roster
    }
}

/// Elementwise arithmetic mean; `None` for an empty or ragged set.
pub fn mean_embedding(raw: &[Embedding]) -> Option<Embedding> {
    let matrix = face::stack_embeddings(raw).ok()?;
    if matrix.ncols() == 0 {
        return None;
    }
    matrix.mean_axis(Axis(0)).map(|vector| Embedding { vector })
}

fn first_face<A>(analyzer: &mut A, image: &Path) -> Option<Embedding>
where
    A: FaceAnalyzer + ?Sized,
{
    match analyzer.analyze(image) {
        Ok(detections) => {
            let count = detections.len();
            let first = detections.into_iter().next();
            match &first {
                Some(_) if count > 1 => debug!(
                    "{}: {} faces, using the first",
                    image.display(),
                    count
                ),
                Some(_) => debug!("Added embedding for face in {}", image.display()),
                None => debug!("No face detected in {}", image.display()),
            }
            first.map(|d| d.embedding)
        }
        Err(e) => {
            warn!("Error processing {}: {:#}", image.display(), e);
            None
        }
    }
}
