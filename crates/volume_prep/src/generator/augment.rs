//! src/generator/augment.rs
//!
//! Eager, randomly-augmented paired batches for training.

use crate::generator::{num_batches, stack_batch, VolSegBatch};
use crate::io;
use crate::pairing::{resolve_pairs, PairedSample};
use crate::preprocess::{PreprocessOp, Preprocessor};
use crate::transform::{AugmentConfig, Transformer};
use anyhow::{ensure, Context, Result};
use ndarray::ArrayD;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Supplies randomly-augmented (volume, segmentation) batches.
///
/// All pairs are resolved, loaded and resized once at construction and kept
/// in memory; each batch request then re-augments the stored arrays with
/// freshly drawn parameters. Memory grows linearly with the dataset; the
/// trade is that an epoch touches the filesystem zero times.
///
/// Randomness advances on every request, so [`batch_at`](Self::batch_at)
/// takes `&mut self` and repeated requests for the same index yield
/// different augmentations of the same underlying samples.
///
/// # Example
/// ```ignore
/// let config = AugmentConfig::builder().rotation_range(15.0).build();
/// let mut gen = AugmentGenerator::new(
///     "data/vol/*/*_t2.nii.gz",
///     "data/seg/*/*_seg.nii.gz",
///     4,
///     Preprocessor::new([64, 64, 64]),
///     config,
/// )?
/// .with_seed(42);
/// for batch in gen.batches() {
///     let batch = batch?; // volumes and segmentations: [b, 64, 64, 64]
/// }
/// ```
#[derive(Debug)]
pub struct AugmentGenerator {
    pairs: Vec<PairedSample>,
    volumes: Vec<ArrayD<f32>>,
    segmentations: Vec<ArrayD<f32>>,
    batch_size: usize,
    transformer: Transformer,
    save_dir: Option<PathBuf>,
    saved: usize,
}

impl AugmentGenerator {
    /// Resolves the pair list, eagerly loads and resizes every file, and
    /// validates the augmentation config.
    ///
    /// All failures surface here, before the first batch is requested: a
    /// bad config, a bad pattern, or any unreadable file (including a
    /// derived volume path that does not exist).
    pub fn new(
        vol_pattern: &str,
        seg_pattern: &str,
        batch_size: usize,
        preprocessor: Preprocessor,
        config: AugmentConfig,
    ) -> Result<Self> {
        ensure!(batch_size > 0, "Batch size must be greater than 0");
        let transformer = Transformer::new(config)?;
        let pairs = resolve_pairs(vol_pattern, seg_pattern)?;
        if pairs.is_empty() {
            warn!(seg_pattern, "segmentation pattern matched no files");
        }

        let ops = [PreprocessOp::Resize];
        let mut volumes = Vec::with_capacity(pairs.len());
        let mut segmentations = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let vol = preprocessor.preprocess(&pair.volume, &ops).with_context(|| {
                format!("Failed to load paired volume {}", pair.volume.display())
            })?;
            let seg = preprocessor.preprocess(&pair.segmentation, &ops).with_context(|| {
                format!("Failed to load segmentation {}", pair.segmentation.display())
            })?;
            volumes.push(vol);
            segmentations.push(seg);
        }
        debug!(samples = pairs.len(), batch_size, "augment generator ready");

        Ok(Self {
            pairs,
            volumes,
            segmentations,
            batch_size,
            transformer,
            save_dir: None,
            saved: 0,
        })
    }

    /// Reseeds the augmentation stream; two generators over the same files
    /// with the same seed produce identical batches.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.transformer.reseed(seed);
        self
    }

    /// Persists every transformed pair into `dir` as
    /// `vol_<sample>_<draw>.nii.gz` / `seg_<sample>_<draw>.nii.gz` before
    /// the batch is returned. Inspection only; the returned batches are
    /// unchanged.
    pub fn save_to_dir<P: Into<PathBuf>>(mut self, dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create save directory {}", dir.display()))?;
        self.save_dir = Some(dir);
        Ok(self)
    }

    /// Number of batches per epoch (the final one may be partial).
    pub fn len(&self) -> usize {
        num_batches(self.volumes.len(), self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Number of resolved pairs.
    pub fn num_samples(&self) -> usize {
        self.volumes.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The resolved (volume, segmentation) path pairs, in batch order.
    pub fn pairs(&self) -> &[PairedSample] {
        &self.pairs
    }

    /// Augments and returns batch `index`.
    ///
    /// Each sample in the range gets one fresh parameter draw, applied
    /// identically to the volume and its mask. Nothing is memoized:
    /// requesting the same index twice re-draws.
    pub fn batch_at(&mut self, index: usize) -> Result<VolSegBatch> {
        let len = self.len();
        ensure!(
            index < len,
            "Batch index {} out of range for {} batch(es)",
            index,
            len
        );
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.volumes.len());

        let mut vols = Vec::with_capacity(end - start);
        let mut segs = Vec::with_capacity(end - start);
        for sample in start..end {
            let (vol, seg) = self
                .transformer
                .transform_pair(&self.volumes[sample], &self.segmentations[sample])
                .with_context(|| format!("Failed to augment sample {}", sample))?;
            self.write_pair(sample, &vol, &seg)?;
            vols.push(vol);
            segs.push(seg);
        }
        Ok(VolSegBatch {
            volumes: stack_batch(&vols)?,
            segmentations: stack_batch(&segs)?,
        })
    }

    /// Iterates one epoch of batches in index order.
    pub fn batches(&mut self) -> AugmentBatches<'_> {
        AugmentBatches {
            generator: self,
            index: 0,
        }
    }

    fn write_pair(&mut self, sample: usize, vol: &ArrayD<f32>, seg: &ArrayD<f32>) -> Result<()> {
        let Some(dir) = self.save_dir.as_deref() else {
            return Ok(());
        };
        let draw = self.saved;
        self.saved += 1;
        io::write_volume(dir.join(format!("vol_{}_{}.nii.gz", sample, draw)), vol)?;
        io::write_volume(dir.join(format!("seg_{}_{}.nii.gz", sample, draw)), seg)?;
        debug!(sample, draw, dir = %dir.display(), "saved augmented pair");
        Ok(())
    }
}

/// Iterator over one epoch of augmented batches.
///
/// Borrowing the generator mutably pins the randomness to this consumer for
/// the epoch's duration.
pub struct AugmentBatches<'a> {
    generator: &'a mut AugmentGenerator,
    index: usize,
}

impl Iterator for AugmentBatches<'_> {
    type Item = Result<VolSegBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.generator.len() {
            return None;
        }
        let batch = self.generator.batch_at(self.index);
        self.index += 1;
        Some(batch)
    }
}
