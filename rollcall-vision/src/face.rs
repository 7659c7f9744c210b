use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Detection score reported for faces whose detector gave none.
pub const DEFAULT_DETECTION_SCORE: f32 = 0.95;

/// Face detection as produced by the external detector/embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4], // x1, y1, x2, y2
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub landmarks: Option<Vec<[f32; 2]>>,
    pub embedding: Embedding,
}

impl Detection {
    pub fn new(bbox: [f32; 4], embedding: Embedding) -> Self {
        Self {
            bbox,
            score: None,
            landmarks: None,
            embedding,
        }
    }

    /// Detection confidence, falling back to [`DEFAULT_DETECTION_SCORE`].
    pub fn confidence(&self) -> f32 {
        self.score.unwrap_or(DEFAULT_DETECTION_SCORE)
    }
}

/// Face embedding, serialized as a plain list of floats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn view(&self) -> ArrayView1<'_, f32> {
        self.vector.view()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.vector.to_vec()
    }
}

/// Stack embeddings of one dimension into an `N x D` matrix.
pub fn stack_embeddings<'a, I>(embeddings: I) -> Result<Array2<f32>>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let views: Vec<ArrayView1<'_, f32>> = embeddings.into_iter().map(Embedding::view).collect();
    if views.is_empty() {
        anyhow::bail!("cannot stack an empty set of embeddings");
    }
    Ok(ndarray::stack(Axis(0), &views)?)
}

/// Cosine similarity (1 - cosine distance) of every query row against every
/// gallery row.
///
/// Both matrices are row-normalised and multiplied once, giving an `M x N`
/// matrix for `M` queries and `N` gallery entries. Cells involving a row
/// with zero norm or a NaN/infinite component are NaN. Returns `None` if the
/// column counts differ.
pub fn similarity_matrix(queries: &Array2<f32>, gallery: &Array2<f32>) -> Option<Array2<f32>> {
    if queries.ncols() != gallery.ncols() {
        return None;
    }
    let q = normalize_rows(queries);
    let g = normalize_rows(gallery);
    let mut sims = q.dot(&g.t());
    sims.mapv_inplace(|s| s.clamp(-1.0, 1.0));
    Some(sims)
}

fn normalize_rows(m: &Array2<f32>) -> Array2<f32> {
    let mut out = m.to_owned();
    for mut row in out.rows_mut() {
        // f64 so tiny or huge f32 components neither underflow nor overflow
        let norm = row
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt();
        if norm > 0.0 && norm.is_finite() {
            row.mapv_inplace(|x| (f64::from(x) / norm) as f32);
        } else {
            row.fill(f32::NAN);
        }
    }
    out
}
