//! Small synthetic datasets with known structure.
//!
//! `labelled_blocks` draws a bright block whose location encodes the label,
//! so an agent has to move its window to the right region to classify.
//! `segmented_scenes` paints rectangular objects and records their ids in a
//! matching mask for the localization environment.
//!
//! Pixels are raw intensities in `[0, 1]`; wrap the source in
//! [`Normalized`](super::Normalized) to get dataset-normalized images.

use ndarray::s;
use rand::Rng;

use super::{Image, Sample, SegmentationMask};

/// Generates `n` labelled images of `size = (height, width)` with `planes`
/// image planes.
///
/// The image is split into a near-square grid with at least `num_labels`
/// cells; the cell of the label is filled with `1.0`, everything else holds
/// low noise in `[0.0, 0.1)`.
pub fn labelled_blocks<R: Rng>(
    n: usize,
    size: (usize, usize),
    planes: usize,
    num_labels: usize,
    rng: &mut R,
) -> Vec<Sample<usize>> {
    let (h, w) = size;
    let grid = grid_side(num_labels.max(1));
    let cell_h = (h / grid).max(1);
    let cell_w = (w / grid).max(1);

    (0..n)
        .map(|_| {
            let label = rng.gen_range(0..num_labels.max(1));
            let mut image = Image::from_shape_fn((planes, h, w), |_| rng.gen_range(0.0..0.1));
            let r0 = ((label / grid) * cell_h).min(h.saturating_sub(1));
            let c0 = ((label % grid) * cell_w).min(w.saturating_sub(1));
            let r1 = (r0 + cell_h).min(h);
            let c1 = (c0 + cell_w).min(w);
            image.slice_mut(s![.., r0..r1, c0..c1]).fill(1.0);
            Sample::new(image, label)
        })
        .collect()
}

/// Generates `n` segmented scenes with up to `objects` rectangular objects
/// on a black background of id `0`.
///
/// Object `i` gets id `i` (1-based) and a uniform color; later objects are
/// painted over earlier ones, so some ids may be fully occluded.
pub fn segmented_scenes<R: Rng>(
    n: usize,
    size: (usize, usize),
    planes: usize,
    objects: u32,
    rng: &mut R,
) -> Vec<Sample<SegmentationMask>> {
    let (h, w) = size;
    let min_side = (h.min(w) / 8).max(1);
    let max_side = (h.min(w) / 3).max(min_side + 1);

    (0..n)
        .map(|_| {
            let mut image = Image::zeros((planes, h, w));
            let mut mask = SegmentationMask::zeros((h, w));
            for id in 1..=objects {
                let oh = rng.gen_range(min_side..max_side).min(h);
                let ow = rng.gen_range(min_side..max_side).min(w);
                let r0 = rng.gen_range(0..=h - oh);
                let c0 = rng.gen_range(0..=w - ow);
                let color: f32 = rng.gen_range(0.25..1.0);
                mask.slice_mut(s![r0..r0 + oh, c0..c0 + ow]).fill(id);
                image
                    .slice_mut(s![.., r0..r0 + oh, c0..c0 + ow])
                    .fill(color);
            }
            Sample::new(image, mask)
        })
        .collect()
}

fn grid_side(cells: usize) -> usize {
    let mut side = 1;
    while side * side < cells {
        side += 1;
    }
    side
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blocks_have_requested_shape_and_labels() {
        let mut rng = StdRng::seed_from_u64(0);
        let samples = labelled_blocks(20, (32, 32), 1, 10, &mut rng);
        assert_eq!(samples.len(), 20);
        for s in &samples {
            assert_eq!(s.image.shape(), &[1, 32, 32]);
            assert!(s.target < 10);
            assert!(s.image.iter().all(|&x| (0.0..=1.0).contains(&x)));
        }
    }

    #[test]
    fn block_location_encodes_label() {
        let mut rng = StdRng::seed_from_u64(5);
        for s in labelled_blocks(10, (32, 32), 1, 4, &mut rng) {
            // 2×2 grid of 16-pixel cells
            let r = (s.target / 2) * 16 + 8;
            let c = (s.target % 2) * 16 + 8;
            assert_eq!(s.image[[0, r, c]], 1.0);
        }
    }

    #[test]
    fn scenes_paint_mask_and_image_together() {
        let mut rng = StdRng::seed_from_u64(1);
        for s in segmented_scenes(5, (64, 64), 3, 4, &mut rng) {
            assert_eq!(s.target.shape(), &[64, 64]);
            for ((r, c), &id) in s.target.indexed_iter() {
                if id == 0 {
                    assert_eq!(s.image[[0, r, c]], 0.0);
                }
            }
            assert!(s.target.iter().any(|&id| id > 0));
        }
    }

    #[test]
    fn grid_side_covers_cells() {
        assert_eq!(grid_side(1), 1);
        assert_eq!(grid_side(4), 2);
        assert_eq!(grid_side(10), 4);
    }
}
