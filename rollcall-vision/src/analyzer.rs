use anyhow::Result;
use std::path::Path;

use crate::face::Detection;

/// External face detector/embedder.
///
/// Implementations return every face found in the image, in the order the
/// detector reports them. An image without faces is `Ok(vec![])`; an image
/// that cannot be processed at all is an error. Calls are synchronous and
/// are not retried.
pub trait FaceAnalyzer {
    fn analyze(&mut self, image: &Path) -> Result<Vec<Detection>>;
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for &mut T {
    fn analyze(&mut self, image: &Path) -> Result<Vec<Detection>> {
        (**self).analyze(image)
    }
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<T> {
    fn analyze(&mut self, image: &Path) -> Result<Vec<Detection>> {
        (**self).analyze(image)
    }
}
