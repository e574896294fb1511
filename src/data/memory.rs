//! Shuffled in-memory data source.

use rand::seq::SliceRandom;
use rand::RngCore;

use super::{DataError, DataSource, Sample};

/// Serves samples held in memory in shuffled order.
///
/// Each pass over the data is a fresh permutation drawn from the generator
/// passed to [`DataSource::next_sample`]; once a pass is exhausted the next
/// pull starts a new one.
#[derive(Debug, Clone)]
pub struct InMemorySource<T> {
    samples: Vec<Sample<T>>,
    order: Vec<usize>,
    cursor: usize,
}

impl<T: Clone> InMemorySource<T> {
    /// Creates a source over the given samples.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Empty`] if `samples` is empty.
    pub fn new(samples: Vec<Sample<T>>) -> Result<Self, DataError> {
        if samples.is_empty() {
            return Err(DataError::Empty);
        }
        Ok(Self {
            order: (0..samples.len()).collect(),
            cursor: samples.len(),
            samples,
        })
    }

    /// Number of samples in one pass.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; an empty source cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<T: Clone> DataSource for InMemorySource<T> {
    type Target = T;

    fn next_sample(&mut self, rng: &mut dyn RngCore) -> Result<Sample<T>, DataError> {
        if self.cursor >= self.order.len() {
            self.order.shuffle(rng);
            self.cursor = 0;
        }
        let idx = self.order[self.cursor];
        self.cursor += 1;
        self.samples.get(idx).cloned().ok_or(DataError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Image;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn labelled(n: usize) -> Vec<Sample<usize>> {
        (0..n)
            .map(|i| Sample::new(Image::zeros((1, 2, 2)), i))
            .collect()
    }

    #[test]
    fn empty_source_rejected() {
        assert_eq!(
            InMemorySource::<usize>::new(vec![]).unwrap_err(),
            DataError::Empty
        );
    }

    #[test]
    fn every_sample_served_once_per_pass() {
        let mut source = InMemorySource::new(labelled(8)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen: Vec<usize> = (0..8)
            .map(|_| source.next_sample(&mut rng).unwrap().target)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_order() {
        let mut a = InMemorySource::new(labelled(16)).unwrap();
        let mut b = a.clone();
        let mut rng_a = StdRng::seed_from_u64(11);
        let mut rng_b = StdRng::seed_from_u64(11);
        for _ in 0..40 {
            assert_eq!(
                a.next_sample(&mut rng_a).unwrap().target,
                b.next_sample(&mut rng_b).unwrap().target
            );
        }
    }
}
