use log::warn;
use ndarray::ArrayView1;
use rollcall_vision::{face, Embedding};
use serde::Serialize;

use crate::roster::Roster;

/// Query embedding tagged with a caller-chosen index (e.g. detection order).
#[derive(Debug, Clone)]
pub struct QueryEmbedding {
    pub index: usize,
    pub embedding: Embedding,
}

impl QueryEmbedding {
    pub fn new(index: usize, embedding: Embedding) -> Self {
        Self { index, embedding }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResult {
    /// `confidence` is the cosine similarity, not a calibrated probability.
    Match { identity: String, confidence: f32 },
    NoMatch,
}

impl MatchResult {
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchResult::Match { identity, .. } => Some(identity),
            MatchResult::NoMatch => None,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            MatchResult::Match { confidence, .. } => Some(*confidence),
            MatchResult::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. })
    }
}

/// Match every query against `roster`; result `i` belongs to query `i`.
///
/// Similarities for all queries come from one `M x N` matrix product. A
/// query matches the identity with the highest similarity (the earliest in
/// roster order on ties) only if that similarity is strictly above
/// `threshold`. Queries that are zero, non-finite or of the wrong dimension
/// never match; an empty roster matches nothing.
pub fn match_batch(queries: &[QueryEmbedding], roster: &Roster, threshold: f32) -> Vec<MatchResult> {
    let mut results = vec![MatchResult::NoMatch; queries.len()];
    let (Some(gallery), Some(dim)) = (roster.gallery(), roster.dim()) else {
        return results;
    };

    let mut rows = Vec::with_capacity(queries.len());
    for (i, query) in queries.iter().enumerate() {
        if query.embedding.dim() == dim {
            rows.push(i);
        } else {
            warn!(
                "query {}: embedding dimension {} does not match roster dimension {}",
                query.index,
                query.embedding.dim(),
                dim
            );
        }
    }
    if rows.is_empty() {
        return results;
    }

    let query_matrix = match face::stack_embeddings(rows.iter().map(|&i| &queries[i].embedding)) {
        Ok(m) => m,
        Err(e) => {
            warn!("cannot build query matrix: {e:#}");
            return results;
        }
    };
    let Some(similarities) = face::similarity_matrix(&query_matrix, gallery) else {
        return results;
    };

    for (&i, row) in rows.iter().zip(similarities.rows()) {
        let Some((best, similarity)) = best_match(row) else {
            continue;
        };
        if similarity > threshold {
            if let Some(name) = roster.name_at(best) {
                results[i] = MatchResult::Match {
                    identity: name.to_string(),
                    confidence: similarity,
                };
            }
        }
    }
    results
}

/// Column of the highest similarity, skipping NaN; first wins on ties.
fn best_match(row: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    row.iter()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |acc, (j, &s)| match acc {
            Some((_, best)) if best >= s => acc,
            _ => Some((j, s)),
        })
}
