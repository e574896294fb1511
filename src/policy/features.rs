//! Feature extractors turning flattened observations into feature vectors.
//!
//! Image observations go through a small convolutional stack whose layout
//! depends on the dataset; vector observations go through a tanh MLP.

use ndarray::Array2;
use rand::Rng;
use tracing::debug;

use super::PolicyError;
use crate::config::{Dataset, PolicyConfig};
use crate::nn::conv::conv_output_size;
use crate::nn::{relu, tanh, Conv2d, Linear, ShapeError};

/// Width of the MLP towers used for flat observations.
pub const MLP_HIDDEN: usize = 64;

/// Maps a `(N, input_dim)` batch to `(N, output_size)` features.
pub trait FeatureExtractor {
    fn output_size(&self) -> usize;

    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>, PolicyError>;
}

impl<F: FeatureExtractor + ?Sized> FeatureExtractor for Box<F> {
    fn output_size(&self) -> usize {
        (**self).output_size()
    }

    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>, PolicyError> {
        (**self).forward(inputs)
    }
}

/// One convolution of a [`ConvArchitecture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvLayerSpec {
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
}

impl ConvLayerSpec {
    const fn new(out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self {
            out_channels,
            kernel,
            stride,
        }
    }
}

/// Convolution stack used for a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvArchitecture {
    layers: [ConvLayerSpec; 3],
}

impl ConvArchitecture {
    pub fn for_dataset(dataset: Dataset) -> Self {
        let layers = match dataset {
            Dataset::Mnist => [
                ConvLayerSpec::new(10, 5, 2),
                ConvLayerSpec::new(20, 5, 1),
                ConvLayerSpec::new(10, 5, 1),
            ],
            Dataset::Cifar10 | Dataset::Cifar100 => [
                ConvLayerSpec::new(6, 5, 2),
                ConvLayerSpec::new(16, 5, 1),
                ConvLayerSpec::new(6, 5, 1),
            ],
            Dataset::Cityscapes => [
                ConvLayerSpec::new(32, 8, 7),
                ConvLayerSpec::new(64, 4, 4),
                ConvLayerSpec::new(32, 3, 1),
            ],
            Dataset::ImageNet | Dataset::Generic => [
                ConvLayerSpec::new(32, 8, 4),
                ConvLayerSpec::new(64, 4, 2),
                ConvLayerSpec::new(32, 3, 1),
            ],
        };
        Self { layers }
    }

    pub fn layers(&self) -> &[ConvLayerSpec] {
        &self.layers
    }

    /// Length of the flattened output of the stack for `height × width`
    /// inputs, `None` if some kernel does not fit.
    pub fn flattened_size(&self, height: usize, width: usize) -> Option<usize> {
        let (mut h, mut w) = (height, width);
        for layer in &self.layers {
            (h, w) = conv_output_size(h, w, layer.kernel, layer.stride)?;
        }
        let channels = self.layers.last().map_or(0, |l| l.out_channels);
        Some(channels * h * w)
    }
}

/// Backbone chosen from the observation shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackboneKind {
    /// Image observations `[C, H, W]`.
    Conv { dataset: Dataset, shape: [usize; 3] },
    /// Vector observations `[D]`.
    Mlp { input_dim: usize },
}

impl BackboneKind {
    /// # Errors
    ///
    /// [`PolicyError::UnsupportedObservationShape`] for any rank other than 1 or 3.
    pub fn resolve(config: &PolicyConfig) -> Result<Self, PolicyError> {
        match *config.observation_shape.as_slice() {
            [c, h, w] => Ok(Self::Conv {
                dataset: config.dataset,
                shape: [c, h, w],
            }),
            [d] => Ok(Self::Mlp { input_dim: d }),
            _ => Err(PolicyError::UnsupportedObservationShape(
                config.observation_shape.clone(),
            )),
        }
    }

    pub fn is_mlp(&self) -> bool {
        matches!(self, Self::Mlp { .. })
    }
}

/// CPU convolutional backbone: conv stack with ReLUs, flatten, then a
/// linear layer to `hidden_size` with a final ReLU.
#[derive(Debug, Clone)]
pub struct ConvBase {
    shape: [usize; 3],
    convs: Vec<Conv2d>,
    flat_size: usize,
    fc: Linear,
}

impl ConvBase {
    /// # Errors
    ///
    /// [`PolicyError::InputTooSmall`] if the dataset's kernels do not fit
    /// the image.
    pub fn new<R: Rng>(
        dataset: Dataset,
        shape: [usize; 3],
        hidden_size: usize,
        rng: &mut R,
    ) -> Result<Self, PolicyError> {
        let [channels, height, width] = shape;
        let arch = ConvArchitecture::for_dataset(dataset);
        let flat_size = arch
            .flattened_size(height, width)
            .filter(|&n| n > 0)
            .ok_or(PolicyError::InputTooSmall {
                dataset,
                height,
                width,
            })?;

        let mut in_channels = channels;
        let mut convs = Vec::with_capacity(arch.layers().len());
        for layer in arch.layers() {
            convs.push(Conv2d::new(
                in_channels,
                layer.out_channels,
                layer.kernel,
                layer.stride,
                rng,
            ));
            in_channels = layer.out_channels;
        }
        debug!(%dataset, ?shape, flat_size, hidden_size, "built conv backbone");

        Ok(Self {
            shape,
            convs,
            flat_size,
            fc: Linear::new(flat_size, hidden_size, rng),
        })
    }
}

impl FeatureExtractor for ConvBase {
    fn output_size(&self) -> usize {
        self.fc.out_features()
    }

    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>, PolicyError> {
        let [c, h, w] = self.shape;
        let n = inputs.nrows();
        let mismatch = ShapeError::Features {
            layer: "conv input",
            expected: c * h * w,
            actual: inputs.ncols(),
        };
        if inputs.ncols() != c * h * w {
            return Err(mismatch.into());
        }
        let mut x = inputs
            .as_standard_layout()
            .into_owned()
            .into_shape((n, c, h, w))
            .map_err(|_| mismatch.clone())?;
        for conv in &self.convs {
            x = relu(conv.forward(&x)?);
        }
        let flat = x
            .as_standard_layout()
            .into_owned()
            .into_shape((n, self.flat_size))
            .map_err(|_| ShapeError::Features {
                layer: "conv flatten",
                expected: self.flat_size,
                actual: x.len() / n.max(1),
            })?;
        Ok(relu(self.fc.forward(&flat)?))
    }
}

/// Two tanh layers of [`MLP_HIDDEN`] units.
#[derive(Debug, Clone)]
pub struct MlpTower {
    l1: Linear,
    l2: Linear,
}

impl MlpTower {
    pub fn new<R: Rng>(input_dim: usize, rng: &mut R) -> Self {
        Self {
            l1: Linear::new(input_dim, MLP_HIDDEN, rng),
            l2: Linear::new(MLP_HIDDEN, MLP_HIDDEN, rng),
        }
    }
}

impl FeatureExtractor for MlpTower {
    fn output_size(&self) -> usize {
        MLP_HIDDEN
    }

    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>, PolicyError> {
        let hidden = tanh(self.l1.forward(inputs)?);
        Ok(tanh(self.l2.forward(&hidden)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionSpace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn flattened_sizes_per_dataset() {
        // 32 -> 14 -> 10 -> 6, 10 channels
        assert_eq!(
            ConvArchitecture::for_dataset(Dataset::Mnist).flattened_size(32, 32),
            Some(360)
        );
        // 256 -> 36 -> 9 -> 7, 32 channels
        assert_eq!(
            ConvArchitecture::for_dataset(Dataset::Cityscapes).flattened_size(256, 256),
            Some(32 * 7 * 7)
        );
        assert_eq!(
            ConvArchitecture::for_dataset(Dataset::Cityscapes).flattened_size(16, 16),
            None
        );
    }

    #[test]
    fn resolve_by_rank() {
        let mut cfg = PolicyConfig {
            observation_shape: vec![2, 32, 32],
            action_space: ActionSpace::Discrete(4),
            dataset: Dataset::Mnist,
            num_labels: Some(10),
            hidden_size: 16,
        };
        assert!(matches!(
            BackboneKind::resolve(&cfg).unwrap(),
            BackboneKind::Conv { shape: [2, 32, 32], .. }
        ));
        cfg.observation_shape = vec![8];
        assert!(BackboneKind::resolve(&cfg).unwrap().is_mlp());
        cfg.observation_shape = vec![4, 4];
        assert_eq!(
            BackboneKind::resolve(&cfg).unwrap_err(),
            PolicyError::UnsupportedObservationShape(vec![4, 4])
        );
    }

    #[test]
    fn conv_base_output_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let base = ConvBase::new(Dataset::Mnist, [2, 32, 32], 16, &mut rng).unwrap();
        let out = base.forward(&Array2::zeros((3, 2 * 32 * 32))).unwrap();
        assert_eq!(out.dim(), (3, 16));
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn conv_base_rejects_wrong_width() {
        let mut rng = StdRng::seed_from_u64(0);
        let base = ConvBase::new(Dataset::Cifar10, [4, 32, 32], 8, &mut rng).unwrap();
        assert!(matches!(
            base.forward(&Array2::zeros((1, 10))),
            Err(PolicyError::Shape(_))
        ));
    }

    #[test]
    fn conv_base_too_small_image() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            ConvBase::new(Dataset::Cityscapes, [4, 20, 20], 8, &mut rng),
            Err(PolicyError::InputTooSmall { height: 20, .. })
        ));
    }

    #[test]
    fn mlp_tower_is_bounded() {
        let mut rng = StdRng::seed_from_u64(0);
        let tower = MlpTower::new(5, &mut rng);
        let out = tower.forward(&Array2::from_elem((2, 5), 100.0)).unwrap();
        assert_eq!(out.dim(), (2, MLP_HIDDEN));
        assert!(out.iter().all(|v| v.abs() <= 1.0));
    }
}
