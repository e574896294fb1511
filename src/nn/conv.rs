use ndarray::{s, Array1, Array2, Array4};
use rand::Rng;

use super::{uniform_init, ShapeError};

/// 2-D convolution with square kernels, no padding.
///
/// Weights are stored flattened as `(out_channels, in_channels * k * k)` so
/// that a forward pass is one matrix product per image over its patches.
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d {
    weight: Array2<f32>,
    bias: Array1<f32>,
    in_channels: usize,
    kernel: usize,
    stride: usize,
}

impl Conv2d {
    /// Creates a convolution with uniformly initialized weights.
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        rng: &mut R,
    ) -> Self {
        let fan_in = in_channels * kernel * kernel;
        Self {
            weight: uniform_init((out_channels, fan_in), fan_in, rng),
            bias: Array1::zeros(out_channels),
            in_channels,
            kernel,
            stride: stride.max(1),
        }
    }

    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    /// Spatial output size for an `height × width` input, `None` if the
    /// kernel does not fit.
    pub fn output_size(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        conv_output_size(height, width, self.kernel, self.stride)
    }

    /// Applies the convolution to an `(N, C, H, W)` batch.
    pub fn forward(&self, x: &Array4<f32>) -> Result<Array4<f32>, ShapeError> {
        let (n, c, h, w) = x.dim();
        if c != self.in_channels {
            return Err(ShapeError::Features {
                layer: "conv2d channels",
                expected: self.in_channels,
                actual: c,
            });
        }
        let (oh, ow) = self.output_size(h, w).ok_or(ShapeError::TooSmall {
            layer: "conv2d",
            height: h,
            width: w,
            kernel: self.kernel,
        })?;

        let k = self.kernel;
        let mut out = Array4::zeros((n, self.out_channels(), oh, ow));
        let mut patches = Array2::<f32>::zeros((oh * ow, self.weight.ncols()));
        for b in 0..n {
            for i in 0..oh {
                for j in 0..ow {
                    let (r, col) = (i * self.stride, j * self.stride);
                    let patch = x.slice(s![b, .., r..r + k, col..col + k]);
                    patches
                        .row_mut(i * ow + j)
                        .iter_mut()
                        .zip(patch.iter())
                        .for_each(|(dst, &src)| *dst = src);
                }
            }
            let y = patches.dot(&self.weight.t()) + &self.bias;
            for ((p, o), &v) in y.indexed_iter() {
                out[[b, o, p / ow, p % ow]] = v;
            }
        }
        Ok(out)
    }
}

/// Output size of a valid (unpadded) convolution.
pub fn conv_output_size(
    height: usize,
    width: usize,
    kernel: usize,
    stride: usize,
) -> Option<(usize, usize)> {
    if height < kernel || width < kernel || kernel == 0 {
        return None;
    }
    let stride = stride.max(1);
    Some(((height - kernel) / stride + 1, (width - kernel) / stride + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn output_sizes_match_reference_architectures() {
        // MNIST stack on 32×32: 5/2 -> 14, 5 -> 10, 5 -> 6
        assert_eq!(conv_output_size(32, 32, 5, 2), Some((14, 14)));
        assert_eq!(conv_output_size(14, 14, 5, 1), Some((10, 10)));
        assert_eq!(conv_output_size(10, 10, 5, 1), Some((6, 6)));
        // Cityscapes stack on 256×256: 8/7 -> 36, 4/4 -> 9, 3 -> 7
        assert_eq!(conv_output_size(256, 256, 8, 7), Some((36, 36)));
        assert_eq!(conv_output_size(36, 36, 4, 4), Some((9, 9)));
        assert_eq!(conv_output_size(4, 4, 5, 1), None);
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut conv = Conv2d::new(1, 1, 1, 1, &mut StdRng::seed_from_u64(0));
        conv.weight.fill(1.0);
        let x = Array4::from_shape_fn((2, 1, 3, 3), |(b, _, r, c)| (b * 9 + r * 3 + c) as f32);
        assert_eq!(conv.forward(&x).unwrap(), x);
    }

    #[test]
    fn summing_kernel_with_stride() {
        let mut conv = Conv2d::new(2, 1, 2, 2, &mut StdRng::seed_from_u64(0));
        conv.weight.fill(1.0);
        conv.bias.fill(0.5);
        let x = Array4::from_elem((1, 2, 4, 4), 1.0);
        let y = conv.forward(&x).unwrap();
        assert_eq!(y.dim(), (1, 1, 2, 2));
        assert!(y.iter().all(|&v| v == 8.5));
    }

    #[test]
    fn wrong_channel_count_rejected() {
        let conv = Conv2d::new(3, 4, 3, 1, &mut StdRng::seed_from_u64(0));
        assert!(conv.forward(&Array4::zeros((1, 2, 8, 8))).is_err());
        assert!(conv.forward(&Array4::zeros((1, 3, 2, 2))).is_err());
    }
}
