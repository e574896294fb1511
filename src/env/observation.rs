//! Observation tensors and the helpers that paint them.
//!
//! An observation is a `(channels, height, width)` array. Channel 0 is the
//! attention mask of the current window; the remaining channels carry image
//! content, or [`UNSEEN`] where the agent has not looked.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use super::EnvError;
use crate::data::Image;
use crate::types::Position;

/// Sentinel stored in content channels for pixels the agent has not seen.
pub const UNSEEN: f32 = -1.0;

/// An environment observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    data: Array3<f32>,
}

impl Observation {
    /// Wraps a raw `(channels, height, width)` array.
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// Shape `(channels, height, width)`.
    pub fn shape(&self) -> [usize; 3] {
        let (c, h, w) = self.data.dim();
        [c, h, w]
    }

    /// The underlying array.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    /// Channel 0: 1 inside the window, 0 elsewhere.
    pub fn attention_mask(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    /// Number of pixels marked visible in the attention mask.
    pub fn visible_pixels(&self) -> usize {
        self.attention_mask().iter().filter(|&&v| v == 1.0).count()
    }

    /// The observation flattened in row-major `(c, h, w)` order.
    pub fn to_flat(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Stacks observations into a `(batch, c*h*w)` matrix, one row each.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::ImageShape`] if the observations differ in shape.
    pub fn stack(observations: &[Observation]) -> Result<Array2<f32>, EnvError> {
        let Some(first) = observations.first() else {
            return Ok(Array2::zeros((0, 0)));
        };
        let shape = first.shape();
        let width: usize = shape.iter().product();
        let mut batch = Array2::zeros((observations.len(), width));
        for (mut row, obs) in batch.axis_iter_mut(Axis(0)).zip(observations) {
            if obs.shape() != shape {
                return Err(EnvError::ImageShape {
                    expected: shape.to_vec(),
                    actual: obs.shape().to_vec(),
                });
            }
            row.iter_mut()
                .zip(obs.data.iter())
                .for_each(|(dst, &src)| *dst = src);
        }
        Ok(batch)
    }
}

/// Paints observation arrays.
pub struct ObservationBuilder;

impl ObservationBuilder {
    /// A fresh observation with an empty mask and every content pixel set to
    /// `fill`.
    pub fn blank(channels: usize, height: usize, width: usize, fill: f32) -> Array3<f32> {
        let mut state = Array3::from_elem((channels, height, width), fill);
        state.index_axis_mut(Axis(0), 0).fill(0.0);
        state
    }

    /// Redraws channel 0 from scratch: zeros everywhere, ones under the window.
    pub fn draw_window(state: &mut Array3<f32>, position: Position, window: usize) {
        let mut mask = state.index_axis_mut(Axis(0), 0);
        mask.fill(0.0);
        mask.slice_mut(s![
            position.row..position.row + window,
            position.col..position.col + window
        ])
        .fill(1.0);
    }

    /// Copies the image pixels under the window into channels `1..`.
    pub fn reveal(state: &mut Array3<f32>, image: &Image, position: Position, window: usize) {
        let rows = position.row..position.row + window;
        let cols = position.col..position.col + window;
        state
            .slice_mut(s![1.., rows.clone(), cols.clone()])
            .assign(&image.slice(s![.., rows, cols]));
    }

    /// Copies the whole image into channels `1..`.
    pub fn reveal_all(state: &mut Array3<f32>, image: &Image) {
        state.slice_mut(s![1.., .., ..]).assign(image);
    }

    /// Resets every content pixel to [`UNSEEN`].
    pub fn hide_content(state: &mut Array3<f32>) {
        state.slice_mut(s![1.., .., ..]).fill(UNSEEN);
    }
}

/// Checks that `image` has `planes` planes of `height × width` pixels.
pub(crate) fn check_image_shape(
    image: &Image,
    planes: usize,
    height: usize,
    width: usize,
) -> Result<(), EnvError> {
    let (p, h, w) = image.dim();
    if (p, h, w) != (planes, height, width) {
        return Err(EnvError::ImageShape {
            expected: vec![planes, height, width],
            actual: vec![p, h, w],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_window_marks_exactly_window_squared() {
        let mut state = ObservationBuilder::blank(2, 32, 32, UNSEEN);
        ObservationBuilder::draw_window(&mut state, Position::new(11, 11), 5);
        let obs = Observation::new(state);
        assert_eq!(obs.visible_pixels(), 25);
        assert_eq!(obs.attention_mask()[[11, 11]], 1.0);
        assert_eq!(obs.attention_mask()[[16, 16]], 0.0);
    }

    #[test]
    fn redraw_clears_previous_window() {
        let mut state = ObservationBuilder::blank(2, 8, 8, UNSEEN);
        ObservationBuilder::draw_window(&mut state, Position::new(0, 0), 2);
        ObservationBuilder::draw_window(&mut state, Position::new(6, 6), 2);
        let obs = Observation::new(state);
        assert_eq!(obs.visible_pixels(), 4);
        assert_eq!(obs.attention_mask()[[0, 0]], 0.0);
    }

    #[test]
    fn reveal_copies_only_the_window() {
        let image = Image::from_elem((1, 8, 8), 0.25);
        let mut state = ObservationBuilder::blank(2, 8, 8, UNSEEN);
        ObservationBuilder::reveal(&mut state, &image, Position::new(2, 3), 3);
        assert_eq!(state[[1, 2, 3]], 0.25);
        assert_eq!(state[[1, 4, 5]], 0.25);
        assert_eq!(state[[1, 5, 5]], UNSEEN);
        assert_eq!(state[[1, 2, 6]], UNSEEN);
    }

    #[test]
    fn stack_rows_match_flattened_observations() {
        let a = Observation::new(Array3::from_elem((2, 2, 2), 1.0));
        let b = Observation::new(Array3::from_elem((2, 2, 2), 2.0));
        let batch = Observation::stack(&[a.clone(), b]).unwrap();
        assert_eq!(batch.dim(), (2, 8));
        assert_eq!(batch.row(0).to_vec(), a.to_flat());
        assert!(batch.row(1).iter().all(|&x| x == 2.0));
    }

    #[test]
    fn stack_rejects_mixed_shapes() {
        let a = Observation::new(Array3::zeros((2, 2, 2)));
        let b = Observation::new(Array3::zeros((2, 3, 2)));
        assert!(matches!(
            Observation::stack(&[a, b]),
            Err(EnvError::ImageShape { .. })
        ));
    }
}
