pub mod config;
pub mod corpus;
pub mod error;
pub mod matcher;
pub mod roster;
pub mod service;
pub mod storage;
pub mod store;

pub use error::StoreError;
pub use matcher::{match_batch, MatchResult, QueryEmbedding};
pub use roster::Roster;
pub use service::FaceService;
pub use store::{EmbeddingStore, EnrollOutcome, RebuildReport};

// Re-export vision types for convenience
pub use rollcall_vision::{face, Detection, Embedding, FaceAnalyzer, SidecarAnalyzer};
