//! NIfTI file I/O: the seam between on-disk volumes and in-memory arrays.

use anyhow::{Context, Result};
use ndarray::{ArrayD, Axis};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::path::Path;

/// Reads a NIfTI volume into an `ArrayD<f32>`.
///
/// Trailing singleton axes beyond the third (the common `(x, y, z, 1)`
/// channel axis) are squeezed so downstream code sees a plain 3-d array.
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<ArrayD<f32>> {
    let path = path.as_ref();
    let object = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let mut volume = object
        .into_volume()
        .into_ndarray::<f32>()
        .with_context(|| format!("Failed to decode voxel data in {}", path.display()))?;
    while volume.ndim() > 3 && volume.shape()[volume.ndim() - 1] == 1 {
        let last = volume.ndim() - 1;
        volume = volume.remove_axis(Axis(last));
    }
    Ok(volume)
}

/// Writes an `ArrayD<f32>` as a NIfTI file.
///
/// Compression follows the extension: `.nii` plain, `.nii.gz` gzipped.
pub fn write_volume<P: AsRef<Path>>(path: P, volume: &ArrayD<f32>) -> Result<()> {
    let path = path.as_ref();
    WriterOptions::new(path)
        .write_nifti(volume)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;
    Ok(())
}
