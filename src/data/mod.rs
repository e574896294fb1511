//! Sample sources feeding the environments.
//!
//! Dataset decoding and download happen outside this crate; an environment
//! only pulls one decoded sample at a time through [`DataSource`].
//! [`InMemorySource`] covers the common case of a dataset that fits in
//! memory, [`synthetic`] generates small labelled and segmented images for
//! tests and demos, and [`Normalized`] applies per-plane statistics to
//! whatever a source yields.

mod error;
pub mod memory;
pub mod synthetic;

pub use error::DataError;
pub use memory::InMemorySource;

use ndarray::{Array2, Array3, Axis};
use rand::RngCore;

use crate::config::Dataset;

/// An image as `(planes, height, width)`: raw `[0, 1]` intensities, or
/// roughly zero-centred once normalized.
pub type Image = Array3<f32>;

/// Per-pixel object ids of a segmented image.
pub type SegmentationMask = Array2<u32>;

/// One image together with its target (a class label or a segmentation mask).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub image: Image,
    pub target: T,
}

impl<T> Sample<T> {
    /// Creates a new sample.
    pub fn new(image: Image, target: T) -> Self {
        Self { image, target }
    }
}

/// A source of samples, pulled one at a time.
///
/// Implementations may buffer or prefetch internally; callers see a blocking
/// pull. Any shuffling draws from the passed `rng`, so two sources fed the
/// same seeded generator yield the same sequence.
pub trait DataSource {
    /// The target type: `usize` labels or [`SegmentationMask`]s.
    type Target;

    /// Returns the next sample.
    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Result<Sample<Self::Target>, DataError>;
}

impl<S: DataSource + ?Sized> DataSource for Box<S> {
    type Target = S::Target;

    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Result<Sample<Self::Target>, DataError> {
        (**self).next_sample(rng)
    }
}

/// A source whose images are normalized with fixed per-plane statistics
/// before they are handed out.
#[derive(Debug, Clone)]
pub struct Normalized<S> {
    inner: S,
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl<S> Normalized<S> {
    pub fn new(inner: S, mean: &[f32], std: &[f32]) -> Self {
        Self {
            inner,
            mean: mean.to_vec(),
            std: std.to_vec(),
        }
    }

    /// Normalizes with the channel statistics of `dataset`.
    pub fn for_dataset(inner: S, dataset: Dataset) -> Self {
        let (mean, std) = dataset.normalization();
        Self::new(inner, mean, std)
    }
}

impl<S: DataSource> DataSource for Normalized<S> {
    type Target = S::Target;

    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Result<Sample<Self::Target>, DataError> {
        let mut sample = self.inner.next_sample(rng)?;
        normalize(&mut sample.image, &self.mean, &self.std)?;
        Ok(sample)
    }
}

/// Normalizes an image in place: `(x - mean) / std` per plane.
///
/// `mean` and `std` hold either a single statistic shared by all planes or
/// one per plane.
///
/// # Errors
///
/// Returns [`DataError::Normalization`] if the statistics do not match the
/// number of planes.
pub fn normalize(image: &mut Image, mean: &[f32], std: &[f32]) -> Result<(), DataError> {
    let planes = image.len_of(Axis(0));
    for stats in [mean, std] {
        if stats.len() != 1 && stats.len() < planes {
            return Err(DataError::Normalization {
                planes,
                given: stats.len(),
            });
        }
    }
    for (p, mut plane) in image.axis_iter_mut(Axis(0)).enumerate() {
        let m = mean[p.min(mean.len() - 1)];
        let s = std[p.min(std.len() - 1)];
        plane.mapv_inplace(|x| (x - m) / s);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn normalize_single_statistic() {
        let mut img = Image::from_elem((2, 2, 2), 1.0);
        normalize(&mut img, &[0.5], &[0.5]).unwrap();
        assert!(img.iter().all(|&x| (x - 1.0).abs() < 1e-6));
    }

    #[test]
    fn normalize_per_plane() {
        let mut img = Image::zeros((2, 1, 1));
        normalize(&mut img, &[0.0, 1.0], &[1.0, 2.0]).unwrap();
        assert_eq!(img[[0, 0, 0]], 0.0);
        assert_eq!(img[[1, 0, 0]], -0.5);
    }

    #[test]
    fn normalize_rejects_mismatched_stats() {
        let mut img = Image::zeros((3, 1, 1));
        let err = normalize(&mut img, &[0.0, 0.0], &[1.0]).unwrap_err();
        assert_eq!(err, DataError::Normalization { planes: 3, given: 2 });
    }

    #[test]
    fn normalized_source_applies_dataset_statistics() {
        let raw = Sample::new(Image::from_elem((1, 2, 2), 0.5), 3_usize);
        let source = InMemorySource::new(vec![raw]).unwrap();
        let mut source = Normalized::for_dataset(source, Dataset::Cifar10);
        let mut rng = StdRng::seed_from_u64(0);
        let sample = source.next_sample(&mut rng).unwrap();
        assert_eq!(sample.target, 3);
        // (0.5 - 0.5) / 0.5
        assert!(sample.image.iter().all(|&x| x.abs() < 1e-6));
    }

    #[test]
    fn normalized_source_reports_mismatched_planes() {
        let raw = Sample::new(Image::zeros((3, 1, 1)), 0_usize);
        let source = InMemorySource::new(vec![raw]).unwrap();
        let mut source = Normalized::new(source, &[0.0, 0.0], &[1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            source.next_sample(&mut rng).unwrap_err(),
            DataError::Normalization { planes: 3, given: 2 }
        );
    }
}
