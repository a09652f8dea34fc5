//! Image sharpness oracles.
//!
//! Pruning keeps the sharper of two near-duplicate keyframes. The score is
//! the variance of the Laplacian of the greyscale image: edges produce large
//! second derivatives, blur flattens them. An image that cannot be read
//! scores 0, so it always loses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::GrayImage;
use parking_lot::Mutex;

#[async_trait]
pub trait SharpnessOracle: Send + Sync {
    /// Higher is sharper. Never fails; unreadable images score 0.
    async fn sharpness(&self, image: &Path) -> f64;
}

#[async_trait]
impl<O: SharpnessOracle + ?Sized> SharpnessOracle for &O {
    async fn sharpness(&self, image: &Path) -> f64 {
        (**self).sharpness(image).await
    }
}

/// Decodes the image from disk and scores it with [`laplacian_variance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplacianSharpness;

#[async_trait]
impl SharpnessOracle for LaplacianSharpness {
    async fn sharpness(&self, path: &Path) -> f64 {
        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || {
            image::open(&owned).map(|img| laplacian_variance(&img.to_luma8()))
        })
        .await;

        match decoded {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                tracing::warn!(image = %path.display(), error = %e, "could not decode keyframe image");
                0.0
            }
            Err(e) => {
                tracing::warn!(image = %path.display(), error = %e, "sharpness task failed");
                0.0
            }
        }
    }
}

/// Variance of the 4-neighbour Laplacian over the interior pixels.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut values = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let at = |x: u32, y: u32| img.get_pixel(x, y)[0] as i32;
            let laplacian = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4 * at(x, y);
            values.push(laplacian as f64);
        }
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Fixed scores by image path. Unknown paths score `fallback`.
#[derive(Debug, Clone, Default)]
pub struct StaticSharpness {
    scores: HashMap<PathBuf, f64>,
    fallback: f64,
}

impl StaticSharpness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, image: impl Into<PathBuf>, score: f64) -> Self {
        self.scores.insert(image.into(), score);
        self
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl SharpnessOracle for StaticSharpness {
    async fn sharpness(&self, image: &Path) -> f64 {
        self.scores.get(image).copied().unwrap_or(self.fallback)
    }
}

/// Memoises another oracle. A keyframe is compared against every close
/// neighbour, so the same image is scored many times in one run.
pub struct CachedSharpness<O> {
    inner: O,
    cache: Mutex<HashMap<PathBuf, f64>>,
}

impl<O: SharpnessOracle> CachedSharpness<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

#[async_trait]
impl<O: SharpnessOracle> SharpnessOracle for CachedSharpness<O> {
    async fn sharpness(&self, image: &Path) -> f64 {
        let cached = self.cache.lock().get(image).copied();
        if let Some(score) = cached {
            return score;
        }
        let score = self.inner.sharpness(image).await;
        self.cache.lock().insert(image.to_path_buf(), score);
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn checkerboard(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    #[test]
    fn test_flat_image_has_zero_variance() {
        let flat = GrayImage::from_pixel(16, 16, Luma([128u8]));
        assert_eq!(laplacian_variance(&flat), 0.0);
    }

    #[test]
    fn test_tiny_image_scores_zero() {
        assert_eq!(laplacian_variance(&checkerboard(2)), 0.0);
    }

    #[test]
    fn test_edges_score_higher_than_gradient() {
        let gradient = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 8) as u8]));
        let sharp = laplacian_variance(&checkerboard(16));
        let smooth = laplacian_variance(&gradient);
        assert!(sharp > smooth, "{sharp} should exceed {smooth}");
    }

    #[tokio::test]
    async fn test_laplacian_oracle_reads_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.00000.png");
        checkerboard(8).save(&path).unwrap();

        let score = LaplacianSharpness.sharpness(&path).await;
        assert_eq!(score, laplacian_variance(&checkerboard(8)));
        assert!(score > 0.0);
    }

    #[tokio::test]
    async fn test_unreadable_image_scores_zero() {
        let dir = tempdir().unwrap();
        let score = LaplacianSharpness
            .sharpness(&dir.path().join("missing.png"))
            .await;
        assert_eq!(score, 0.0);
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl SharpnessOracle for Counting {
        async fn sharpness(&self, _image: &Path) -> f64 {
            self.0.fetch_add(1, Ordering::SeqCst) as f64 + 1.0
        }
    }

    #[tokio::test]
    async fn test_cache_scores_each_image_once() {
        let cached = CachedSharpness::new(Counting(AtomicUsize::new(0)));
        let a = Path::new("a.png");

        assert_eq!(cached.sharpness(a).await, 1.0);
        assert_eq!(cached.sharpness(a).await, 1.0);
        assert_eq!(cached.sharpness(Path::new("b.png")).await, 2.0);
        assert_eq!(cached.len(), 2);
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_scores_with_fallback() {
        let oracle = StaticSharpness::new()
            .with_score("kf/1.00000.png", 10.0)
            .with_fallback(3.0);
        assert_eq!(oracle.sharpness(Path::new("kf/1.00000.png")).await, 10.0);
        assert_eq!(oracle.sharpness(Path::new("kf/2.00000.png")).await, 3.0);
    }
}
