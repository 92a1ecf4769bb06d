//! src/generator/volume.rs
//!
//! Lazy batched access to single (unpaired) volumes.

use crate::generator::{num_batches, stack_batch};
use crate::preprocess::{PreprocessOp, Preprocessor};
use anyhow::{ensure, Context, Result};
use ndarray::ArrayD;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Serves fixed-size batches of preprocessed volumes without holding more
/// than one batch in memory.
///
/// Two access paths share the resolved file list but no mutable state:
/// - [`batch_at`](Self::batch_at) loads any batch by index, statelessly;
/// - [`iter`](Self::iter) returns a fresh [`VolumeStream`] cursor that walks
///   the batches in order and ends with `None`.
///
/// # Example
/// ```ignore
/// let gen = VolumeGenerator::new(
///     "scans/*/*_t2.nii.gz",
///     4,
///     Preprocessor::new([64, 64, 64]),
///     true,
/// )?;
/// for batch in gen.iter() {
///     let batch = batch?; // shape [b, 64, 64, 64]
/// }
/// ```
#[derive(Debug)]
pub struct VolumeGenerator {
    files: Vec<PathBuf>,
    batch_size: usize,
    preprocessor: Preprocessor,
    ops: Vec<PreprocessOp>,
}

impl VolumeGenerator {
    /// Resolves `pattern` once and fixes the preprocessing pipeline:
    /// rescale before resize when `rescale` is set, resize only otherwise.
    pub fn new(
        pattern: &str,
        batch_size: usize,
        preprocessor: Preprocessor,
        rescale: bool,
    ) -> Result<Self> {
        ensure!(batch_size > 0, "Batch size must be greater than 0");
        let matches = glob::glob(pattern)
            .with_context(|| format!("Invalid volume glob pattern {:?}", pattern))?;
        let mut files = Vec::new();
        for entry in matches {
            files.push(entry.context("Failed to enumerate volume files")?);
        }
        if files.is_empty() {
            warn!(pattern, "volume pattern matched no files");
        }
        let ops = if rescale {
            vec![PreprocessOp::Rescale, PreprocessOp::Resize]
        } else {
            vec![PreprocessOp::Resize]
        };
        debug!(files = files.len(), batch_size, "volume generator ready");
        Ok(Self {
            files,
            batch_size,
            preprocessor,
            ops,
        })
    }

    /// Number of batches (the final one may be partial).
    pub fn len(&self) -> usize {
        num_batches(self.files.len(), self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of matched files.
    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Loads and preprocesses batch `index`, fresh on every call.
    ///
    /// Stateless: any index, in any order, any number of times; repeated
    /// calls return identical arrays and never touch the streaming cursor.
    pub fn batch_at(&self, index: usize) -> Result<ArrayD<f32>> {
        let len = self.len();
        ensure!(
            index < len,
            "Batch index {} out of range for {} batch(es)",
            index,
            len
        );
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.files.len());
        self.load_range(start, end)
    }

    /// Begins a fresh pass over the batches.
    ///
    /// Every call starts from the first file again, including after a
    /// previous stream was exhausted.
    pub fn iter(&self) -> VolumeStream<'_> {
        VolumeStream {
            generator: self,
            cursor: 0,
        }
    }

    fn load_range(&self, start: usize, end: usize) -> Result<ArrayD<f32>> {
        let mut samples = Vec::with_capacity(end - start);
        for path in &self.files[start..end] {
            let volume = self
                .preprocessor
                .preprocess(path, &self.ops)
                .with_context(|| format!("Failed to preprocess {}", path.display()))?;
            samples.push(volume);
        }
        stack_batch(&samples)
    }
}

impl<'a> IntoIterator for &'a VolumeGenerator {
    type Item = Result<ArrayD<f32>>;
    type IntoIter = VolumeStream<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor over a [`VolumeGenerator`]'s batches.
///
/// Exhaustion is `None`; a partial final batch is yielded, never an empty
/// one. A failed file aborts the batch it belongs to and leaves the cursor
/// advanced past it; there is no retry or skip.
pub struct VolumeStream<'a> {
    generator: &'a VolumeGenerator,
    cursor: usize,
}

impl Iterator for VolumeStream<'_> {
    type Item = Result<ArrayD<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.generator.files.len();
        if self.cursor >= total {
            return None;
        }
        let start = self.cursor;
        let end = (start + self.generator.batch_size).min(total);
        self.cursor = end;
        Some(self.generator.load_range(start, end))
    }
}
