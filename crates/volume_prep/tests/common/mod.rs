#![allow(dead_code)]

use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use volume_prep::io;

/// Builds a volume of the given shape with a per-voxel fill function.
pub fn volume_filled(shape: &[usize], fill: impl Fn(usize, usize, usize) -> f32) -> ArrayD<f32> {
    let mut vol = ArrayD::zeros(IxDyn(shape));
    for i in 0..shape[0] {
        for j in 0..shape[1] {
            for k in 0..shape[2] {
                vol[[i, j, k]] = fill(i, j, k);
            }
        }
    }
    vol
}

/// Writes `n` unpaired volumes under `root` as
/// `<case>/<case>_t2.nii.gz` and returns the matching glob pattern.
///
/// Each case gets distinct voxel values so batch content identifies which
/// files it came from.
pub fn write_volume_tree(root: &Path, n: usize, shape: &[usize]) -> Result<String> {
    for case in 0..n {
        let name = format!("case{:02}", case);
        let dir = root.join(&name);
        std::fs::create_dir_all(&dir)?;
        let vol = volume_filled(shape, |i, j, k| (case * 1000 + i * 16 + j * 4 + k) as f32);
        io::write_volume(dir.join(format!("{}_t2.nii.gz", name)), &vol)?;
    }
    Ok(format!("{}/*/*_t2.nii.gz", root.display()))
}

/// Writes `n` paired volume/segmentation files under `root` in the
/// `vol/<case>/<case>_t2.nii.gz` + `seg/<case>/<case>_seg.nii.gz` layout
/// and returns the (volume, segmentation) glob patterns.
pub fn write_paired_tree(root: &Path, n: usize, shape: &[usize]) -> Result<(String, String)> {
    for case in 0..n {
        let vol = volume_filled(shape, |i, j, k| (case * 1000 + i * 16 + j * 4 + k) as f32);
        let seg = volume_filled(shape, |i, j, k| ((i + j + k) % 2) as f32);
        write_pair(root, case, &vol, &seg)?;
    }
    Ok(paired_patterns(root))
}

/// Like [`write_paired_tree`], but the segmentation file of each pair is a
/// byte-for-byte copy of its volume. With identical inputs, any divergence
/// between augmented volumes and masks can only come from divergent draws.
pub fn write_mirrored_tree(root: &Path, n: usize, shape: &[usize]) -> Result<(String, String)> {
    for case in 0..n {
        let vol = volume_filled(shape, |i, j, k| (case * 1000 + i * 16 + j * 4 + k) as f32);
        write_pair(root, case, &vol, &vol)?;
    }
    Ok(paired_patterns(root))
}

/// The glob patterns matching [`write_paired_tree`]'s layout.
pub fn paired_patterns(root: &Path) -> (String, String) {
    (
        format!("{}/vol/*/*_t2.nii.gz", root.display()),
        format!("{}/seg/*/*_seg.nii.gz", root.display()),
    )
}

fn write_pair(root: &Path, case: usize, vol: &ArrayD<f32>, seg: &ArrayD<f32>) -> Result<()> {
    let name = format!("case{:02}", case);
    let vol_dir = root.join("vol").join(&name);
    let seg_dir = root.join("seg").join(&name);
    std::fs::create_dir_all(&vol_dir)?;
    std::fs::create_dir_all(&seg_dir)?;
    io::write_volume(vol_dir.join(format!("{}_t2.nii.gz", name)), vol)?;
    io::write_volume(seg_dir.join(format!("{}_seg.nii.gz", name)), seg)?;
    Ok(())
}
