//! Convolutional backbone on tch-rs (PyTorch bindings).
//!
//! Same layer layout as [`ConvBase`](super::features::ConvBase), run by
//! libtorch. Only available with the `rl-nn` feature.

use ndarray::Array2;
use tch::{nn, nn::Module, Device, Kind, Tensor};

use super::features::{ConvArchitecture, FeatureExtractor};
use super::PolicyError;
use crate::config::Dataset;
use crate::nn::ShapeError;

/// Conv stack + flatten + linear + ReLU, on a libtorch device.
pub struct TchConvBase {
    vs: nn::VarStore,
    net: nn::Sequential,
    shape: [usize; 3],
    hidden_size: usize,
}

impl TchConvBase {
    /// Creates a new backbone on `device`.
    pub fn new(
        dataset: Dataset,
        shape: [usize; 3],
        hidden_size: usize,
        device: Device,
    ) -> Result<Self, PolicyError> {
        let [channels, height, width] = shape;
        let arch = ConvArchitecture::for_dataset(dataset);
        let flat = arch
            .flattened_size(height, width)
            .filter(|&n| n > 0)
            .ok_or(PolicyError::InputTooSmall {
                dataset,
                height,
                width,
            })?;

        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let mut net = nn::seq();
        let mut in_channels = channels as i64;
        for (i, layer) in arch.layers().iter().enumerate() {
            let config = nn::ConvConfig {
                stride: layer.stride as i64,
                ..Default::default()
            };
            net = net
                .add(nn::conv2d(
                    p / format!("conv{i}"),
                    in_channels,
                    layer.out_channels as i64,
                    layer.kernel as i64,
                    config,
                ))
                .add_fn(|x| x.relu());
            in_channels = layer.out_channels as i64;
        }
        let net = net
            .add_fn(|x| x.flatten(1, -1))
            .add(nn::linear(
                p / "fc",
                flat as i64,
                hidden_size as i64,
                Default::default(),
            ))
            .add_fn(|x| x.relu());

        Ok(Self {
            vs,
            net,
            shape,
            hidden_size,
        })
    }

    /// Returns a reference to the variable store (for optimizers and checkpoints).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

impl FeatureExtractor for TchConvBase {
    fn output_size(&self) -> usize {
        self.hidden_size
    }

    fn forward(&self, inputs: &Array2<f32>) -> Result<Array2<f32>, PolicyError> {
        let [c, h, w] = self.shape;
        let n = inputs.nrows();
        if inputs.ncols() != c * h * w {
            return Err(ShapeError::Features {
                layer: "tch conv input",
                expected: c * h * w,
                actual: inputs.ncols(),
            }
            .into());
        }
        let values: Vec<f32> = inputs.iter().copied().collect();
        let x = Tensor::from_slice(&values)
            .reshape([n as i64, c as i64, h as i64, w as i64])
            .to_device(self.vs.device());
        let y = tch::no_grad(|| self.net.forward(&x))
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .flatten(0, -1);
        let features =
            Vec::<f32>::try_from(&y).map_err(|e| PolicyError::Backend(e.to_string()))?;
        Array2::from_shape_vec((n, self.hidden_size), features)
            .map_err(|e| PolicyError::Backend(e.to_string()))
    }
}
