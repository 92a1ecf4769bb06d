//! src/preprocess.rs
//!
//! Normalizes raw volumes into fixed-shape, fixed-scale arrays.
//!
//! A [`Preprocessor`] reads a file and runs an ordered pipeline of
//! [`PreprocessOp`]s over it. The generators pick the pipeline per use case:
//! resize only for paired training data, rescale + resize for plain
//! inference streams. [`rescale`] and [`resize`] are also exposed directly
//! as pure functions on arrays.

use crate::io;
use anyhow::{ensure, Context, Result};
use ndarray::{ArrayD, IxDyn};
use std::path::Path;

/// A named preprocessing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessOp {
    /// Min-max intensity normalization to `[0, 1]`.
    Rescale,
    /// Trilinear interpolation to the preprocessor's target shape.
    Resize,
}

/// Loads files and applies an ordered operation pipeline.
///
/// Every volume that goes through [`PreprocessOp::Resize`] comes out with
/// the same target shape, which is what makes batches stackable.
///
/// # Example
/// ```ignore
/// let pre = Preprocessor::new([64, 64, 64]);
/// let vol = pre.preprocess("scans/case0/case0_t2.nii.gz", &[PreprocessOp::Resize])?;
/// assert_eq!(vol.shape(), &[64, 64, 64]);
/// ```
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_shape: [usize; 3],
}

impl Preprocessor {
    pub fn new(target_shape: [usize; 3]) -> Self {
        Self { target_shape }
    }

    pub fn target_shape(&self) -> [usize; 3] {
        self.target_shape
    }

    /// Reads `path` and applies `ops` in order.
    ///
    /// Deterministic: the same file and pipeline always produce the same
    /// array. Read failures carry the offending path.
    pub fn preprocess<P: AsRef<Path>>(&self, path: P, ops: &[PreprocessOp]) -> Result<ArrayD<f32>> {
        let path = path.as_ref();
        let mut volume = io::read_volume(path)?;
        for op in ops {
            volume = match op {
                PreprocessOp::Rescale => rescale(volume),
                PreprocessOp::Resize => resize(volume, self.target_shape)
                    .with_context(|| format!("Failed to resize {}", path.display()))?,
            };
        }
        Ok(volume)
    }
}

/// Min-max rescale to `[0, 1]`. A constant volume maps to all zeros.
pub fn rescale(volume: ArrayD<f32>) -> ArrayD<f32> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in volume.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return ArrayD::zeros(volume.raw_dim());
    }
    volume.mapv_into(|v| (v - min) / range)
}

/// Trilinear resize to `target_shape`, with half-pixel sample centers and
/// edge clamping.
pub fn resize(volume: ArrayD<f32>, target_shape: [usize; 3]) -> Result<ArrayD<f32>> {
    ensure!(
        volume.ndim() == 3,
        "Resize expects a 3-d volume, got {} dimension(s)",
        volume.ndim()
    );
    ensure!(
        volume.shape().iter().all(|&d| d > 0),
        "Cannot resize an empty volume (shape {:?})",
        volume.shape()
    );
    ensure!(
        target_shape.iter().all(|&d| d > 0),
        "Target shape must be positive in every dimension (got {:?})",
        target_shape
    );

    let src = [volume.shape()[0], volume.shape()[1], volume.shape()[2]];
    let scale = [
        src[0] as f32 / target_shape[0] as f32,
        src[1] as f32 / target_shape[1] as f32,
        src[2] as f32 / target_shape[2] as f32,
    ];

    let mut out = ArrayD::zeros(IxDyn(&target_shape));
    for i in 0..target_shape[0] {
        let (i0, i1, fi) = sample_coords(i, src[0], scale[0]);
        for j in 0..target_shape[1] {
            let (j0, j1, fj) = sample_coords(j, src[1], scale[1]);
            for k in 0..target_shape[2] {
                let (k0, k1, fk) = sample_coords(k, src[2], scale[2]);

                let c000 = volume[[i0, j0, k0]];
                let c001 = volume[[i0, j0, k1]];
                let c010 = volume[[i0, j1, k0]];
                let c011 = volume[[i0, j1, k1]];
                let c100 = volume[[i1, j0, k0]];
                let c101 = volume[[i1, j0, k1]];
                let c110 = volume[[i1, j1, k0]];
                let c111 = volume[[i1, j1, k1]];

                let c00 = c000 + (c100 - c000) * fi;
                let c01 = c001 + (c101 - c001) * fi;
                let c10 = c010 + (c110 - c010) * fi;
                let c11 = c011 + (c111 - c011) * fi;
                let c0 = c00 + (c10 - c00) * fj;
                let c1 = c01 + (c11 - c01) * fj;
                out[[i, j, k]] = c0 + (c1 - c0) * fk;
            }
        }
    }
    Ok(out)
}

/// Maps an output index to its two source neighbours and the weight of the
/// upper one.
fn sample_coords(out_idx: usize, src_dim: usize, scale: f32) -> (usize, usize, f32) {
    let center = (out_idx as f32 + 0.5) * scale - 0.5;
    let clamped = center.clamp(0.0, (src_dim - 1) as f32);
    let lo = clamped.floor() as usize;
    let hi = (lo + 1).min(src_dim - 1);
    (lo, hi, clamped - lo as f32)
}
