use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::Mutex;
use rollcall_vision::{Embedding, FaceAnalyzer};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::corpus::Corpus;
use crate::matcher::{self, MatchResult, QueryEmbedding};
use crate::store::{EmbeddingStore, RebuildReport};

pub const UNKNOWN: &str = "Unknown";

/// Detect / recognize / enroll / list operations over one store and one
/// analyzer.
pub struct FaceService<A> {
    store: EmbeddingStore,
    analyzer: Mutex<A>,
    dataset_dir: PathBuf,
    image_extensions: Vec<String>,
    threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub dataset_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedFace {
    pub face_id: usize,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub landmarks: Option<Vec<[f32; 2]>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedFace {
    pub face_id: usize,
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub name: String,
    pub recognition_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub person_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub total_faces: usize,
    pub recognized_faces: Vec<RecognizedFace>,
    pub attendance_records: Vec<AttendanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollReport {
    pub count_enrolled: usize,
    pub usable: usize,
    pub computed: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub image_count: usize,
    pub has_embedding: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub dataset: Vec<IdentitySummary>,
    pub total_people: usize,
    pub total_embeddings: usize,
}

impl<A: FaceAnalyzer> FaceService<A> {
    /// Service with an empty store; call [`FaceService::open`] to load.
    pub fn new(config: &Config, analyzer: A) -> Self {
        Self {
            store: EmbeddingStore::new(&config.embeddings_file),
            analyzer: Mutex::new(analyzer),
            dataset_dir: config.dataset_dir.clone(),
            image_extensions: config.image_extensions.clone(),
            threshold: config.threshold,
        }
    }

    /// Load the snapshot, recomputing from the dataset when it is missing
    /// or unreadable.
    pub fn open(config: &Config, analyzer: A) -> Result<Self> {
        let service = Self::new(config, analyzer);
        match service.store.try_load() {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("Recomputing dataset embeddings...");
                service.recompute_all()?;
            }
            Err(e) => {
                warn!("Error loading embeddings file: {}", e);
                service.recompute_all()?;
            }
        }
        Ok(service)
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Configured recognition threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn health(&self) -> Health {
        Health {
            status: "healthy",
            dataset_size: self.store.size(),
        }
    }

    pub fn detect(&self, image: &Path) -> Result<Vec<DetectedFace>> {
        let detections = self
            .analyzer
            .lock()
            .analyze(image)
            .with_context(|| format!("detecting faces in {}", image.display()))?;
        Ok(detections
            .into_iter()
            .enumerate()
            .map(|(face_id, d)| DetectedFace {
                face_id,
                bbox: d.bbox,
                confidence: d.confidence(),
                landmarks: d.landmarks,
            })
            .collect())
    }

    pub fn recognize(&self, image: &Path, threshold: f32) -> Result<Recognition> {
        let detections = self
            .analyzer
            .lock()
            .analyze(image)
            .with_context(|| format!("recognizing faces in {}", image.display()))?;

        let queries: Vec<QueryEmbedding> = detections
            .iter()
            .enumerate()
            .map(|(i, d)| QueryEmbedding::new(i, d.embedding.clone()))
            .collect();
        let roster = self.store.snapshot();
        let matches = matcher::match_batch(&queries, &roster, threshold);

        let mut recognized_faces = Vec::with_capacity(detections.len());
        let mut attendance_records = Vec::new();
        for (face_id, (detection, result)) in detections.iter().zip(matches).enumerate() {
            let (name, recognition_confidence) = match result {
                MatchResult::Match {
                    identity,
                    confidence,
                } => {
                    attendance_records.push(AttendanceRecord {
                        person_name: identity.clone(),
                        confidence,
                        bbox: detection.bbox,
                    });
                    (identity, confidence)
                }
                MatchResult::NoMatch => (UNKNOWN.to_string(), 0.0),
            };
            recognized_faces.push(RecognizedFace {
                face_id,
                bbox: detection.bbox,
                confidence: detection.confidence(),
                name,
                recognition_confidence,
            });
        }

        info!(
            "{}: {} face(s), {} recognized",
            image.display(),
            recognized_faces.len(),
            attendance_records.len()
        );
        Ok(Recognition {
            total_faces: recognized_faces.len(),
            recognized_faces,
            attendance_records,
        })
    }

    /// Enroll `name` from `images`, using the first face of each image.
    ///
    /// Images are analyzed where they are and are not copied into
    /// `<dataset_dir>/<name>/`. An identity enrolled only from images outside
    /// that directory is listed with an image count of 0 and is dropped by the
    /// next [`FaceService::recompute_all`].
    pub fn enroll(&self, name: &str, images: &[PathBuf]) -> Result<EnrollReport> {
        let identity_dir = self.dataset_dir.join(name);
        let outside = images
            .iter()
            .filter(|image| !image.starts_with(&identity_dir))
            .count();
        if outside > 0 {
            warn!(
                "{} of {} image(s) for {} are outside {} and will not survive a recompute",
                outside,
                images.len(),
                name,
                identity_dir.display()
            );
        }

        let raw: Vec<Embedding> = {
            let mut analyzer = self.analyzer.lock();
            images
                .iter()
                .filter_map(|image| match analyzer.analyze(image) {
                    Ok(detections) => detections.into_iter().next().map(|d| d.embedding),
                    Err(e) => {
                        warn!("Error processing {}: {:#}", image.display(), e);
                        None
                    }
                })
                .collect()
        };

        let outcome = self
            .store
            .enroll(name, &raw)
            .with_context(|| format!("enrolling {}", name))?;
        Ok(EnrollReport {
            count_enrolled: images.len(),
            usable: raw.len(),
            computed: outcome.computed,
            persisted: outcome.persisted,
        })
    }

    /// Every identity in the dataset directory, plus stored identities that
    /// have no directory.
    pub fn list(&self) -> Result<DatasetInfo> {
        let corpus = Corpus::scan(&self.dataset_dir, &self.image_extensions)?;
        let roster = self.store.snapshot();

        let mut dataset: Vec<IdentitySummary> = corpus
            .identities()
            .map(|(name, images)| IdentitySummary {
                name: name.to_string(),
                image_count: images.len(),
                has_embedding: roster.contains(name),
            })
            .collect();
        dataset.extend(
            roster
                .names()
                .filter(|name| corpus.images(name).is_none())
                .map(|name| IdentitySummary {
                    name: name.to_string(),
                    image_count: 0,
                    has_embedding: true,
                }),
        );

        Ok(DatasetInfo {
            total_people: dataset.len(),
            total_embeddings: roster.len(),
            dataset,
        })
    }

    /// Rebuild the store from the dataset directory.
    pub fn recompute_all(&self) -> Result<RebuildReport> {
        let corpus = Corpus::scan(&self.dataset_dir, &self.image_extensions)?;
        let mut analyzer = self.analyzer.lock();
        let report = self.store.rebuild(&corpus, &mut *analyzer);
        if !report.persisted {
            warn!(
                "embeddings recomputed but not saved to {}",
                self.store.path().display()
            );
        }
        Ok(report)
    }
}
