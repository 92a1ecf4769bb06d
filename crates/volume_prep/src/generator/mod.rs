//! src/generator/mod.rs
//!
//! Batch generators: the consumption surface of the crate.
//!
//! # Architecture
//!
//! ```text
//!                 +--------------------+
//!   vol pattern ->|                    |   VolSegBatch (volumes + masks,
//!   seg pattern ->|  AugmentGenerator  |-> augmented, fresh draw per
//!                 |  (eager, paired)   |   sample per request)
//!                 +--------------------+
//!                    |           |
//!              Preprocessor  Transformer
//!
//!                 +--------------------+
//!       pattern ->|  VolumeGenerator   |   ArrayD batches (plain,
//!                 |  (lazy, unpaired)  |-> deterministic, streamed or
//!                 +--------------------+   indexed)
//!                    |
//!              Preprocessor
//! ```
//!
//! Both generators resolve their file lists once at construction and batch
//! with the same arithmetic: `ceil(n / batch_size)` batches, the final one
//! partial but never empty. They differ in lifecycle: [`AugmentGenerator`]
//! holds every preprocessed pair in memory and re-augments on each request,
//! while [`VolumeGenerator`] keeps only paths and loads per batch.
//!
//! Module organization:
//! - `augment`: eager paired generator with randomized augmentation
//! - `volume`: lazy unpaired generator with indexed + streaming access

mod augment;
mod volume;

pub use augment::{AugmentBatches, AugmentGenerator};
pub use volume::{VolumeGenerator, VolumeStream};

use anyhow::{ensure, Context, Result};
use ndarray::{ArrayD, ArrayViewD, Axis};

/// One augmented training batch: volumes and their masks stacked with the
/// same leading dimension.
#[derive(Debug, Clone)]
pub struct VolSegBatch {
    pub volumes: ArrayD<f32>,
    pub segmentations: ArrayD<f32>,
}

impl VolSegBatch {
    /// Number of samples in the batch (the leading dimension).
    pub fn batch_size(&self) -> usize {
        self.volumes.shape().first().copied().unwrap_or(0)
    }
}

/// Stacks sample arrays along a new leading axis.
///
/// All samples must share one shape; the output shape is `[n, ..sample]`.
pub fn stack_batch(samples: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
    ensure!(!samples.is_empty(), "Cannot stack an empty batch");
    let first = samples[0].shape();
    for (i, sample) in samples.iter().enumerate() {
        ensure!(
            sample.shape() == first,
            "Sample {} has shape {:?} but the batch leads with {:?}",
            i,
            sample.shape(),
            first
        );
    }
    let views: Vec<ArrayViewD<f32>> = samples.iter().map(|s| s.view()).collect();
    ndarray::stack(Axis(0), &views).context("Failed to stack batch")
}

/// Number of batches needed to cover `total` samples.
pub(crate) fn num_batches(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_num_batches_rounds_up() {
        assert_eq!(num_batches(10, 4), 3);
        assert_eq!(num_batches(8, 4), 2);
        assert_eq!(num_batches(1, 4), 1);
        assert_eq!(num_batches(0, 4), 0);
    }

    #[test]
    fn test_stack_batch_adds_leading_axis() -> Result<()> {
        let samples = vec![
            ArrayD::from_elem(IxDyn(&[2, 3]), 1.0f32),
            ArrayD::from_elem(IxDyn(&[2, 3]), 2.0f32),
        ];
        let batch = stack_batch(&samples)?;
        assert_eq!(batch.shape(), &[2, 2, 3]);
        assert_eq!(batch[[0, 0, 0]], 1.0);
        assert_eq!(batch[[1, 1, 2]], 2.0);
        Ok(())
    }

    #[test]
    fn test_stack_batch_rejects_mixed_shapes() {
        let samples = vec![
            ArrayD::from_elem(IxDyn(&[2, 3]), 1.0f32),
            ArrayD::from_elem(IxDyn(&[3, 2]), 2.0f32),
        ];
        assert!(stack_batch(&samples).is_err());
    }

    #[test]
    fn test_stack_batch_rejects_empty_input() {
        assert!(stack_batch(&[]).is_err());
    }
}
