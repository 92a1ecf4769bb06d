//! src/pairing.rs
//!
//! Filename-convention pairing of raw volumes with segmentation masks.
//!
//! Both file sets are described by glob patterns that share a split marker
//! (`*/*`). The segmentation pattern is the authoritative one: it is expanded
//! against the filesystem, and each match is rewritten into its partner
//! volume path by swapping the pattern fragments around the marker. The
//! rewrite is purely textual; nothing checks that the derived file exists
//! until it is read. Use [`verify_pairs`] for an eager existence check.

use anyhow::{ensure, Context, Result};
use std::path::{Path, PathBuf};

/// Marker token that splits a pattern into its prefix and suffix fragments.
pub const SPLIT_MARKER: &str = "*/*";

/// One (volume, segmentation) file pair.
///
/// The segmentation path came from the filesystem; the volume path was
/// derived from it and may or may not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedSample {
    pub volume: PathBuf,
    pub segmentation: PathBuf,
}

/// Prefix/suffix fragments of a volume and a segmentation glob pattern.
///
/// Construction validates the marker arity; path derivation is pure string
/// rewriting and never touches the filesystem.
///
/// # Example
/// ```ignore
/// let pair = PatternPair::new("data/vol/*/*_t2.nii.gz", "data/seg/*/*_seg.nii.gz")?;
/// let vol = pair.derive_volume_path("data/seg/case7/case7_seg.nii.gz");
/// assert_eq!(vol, "data/vol/case7/case7_t2.nii.gz");
/// ```
#[derive(Debug, Clone)]
pub struct PatternPair {
    vol_prefix: String,
    vol_suffix: String,
    seg_prefix: String,
    seg_suffix: String,
    seg_pattern: String,
}

impl PatternPair {
    /// Splits both patterns on [`SPLIT_MARKER`].
    ///
    /// # Errors
    /// Fails if either pattern does not contain the marker exactly once.
    pub fn new(vol_pattern: &str, seg_pattern: &str) -> Result<Self> {
        let (vol_prefix, vol_suffix) =
            split_on_marker(vol_pattern).context("Invalid volume pattern")?;
        let (seg_prefix, seg_suffix) =
            split_on_marker(seg_pattern).context("Invalid segmentation pattern")?;
        Ok(Self {
            vol_prefix,
            vol_suffix,
            seg_prefix,
            seg_suffix,
            seg_pattern: seg_pattern.to_string(),
        })
    }

    /// Rewrites a segmentation path into its partner volume path.
    ///
    /// Every occurrence of each segmentation fragment is replaced, matching
    /// the behaviour the file naming convention was built around.
    pub fn derive_volume_path(&self, seg_path: &str) -> String {
        seg_path
            .replace(&self.seg_prefix, &self.vol_prefix)
            .replace(&self.seg_suffix, &self.vol_suffix)
    }

    /// Inverse rewrite: volume path back to its segmentation path.
    pub fn derive_segmentation_path(&self, vol_path: &str) -> String {
        vol_path
            .replace(&self.vol_prefix, &self.seg_prefix)
            .replace(&self.vol_suffix, &self.seg_suffix)
    }

    /// Expands the segmentation pattern and derives the partner volume path
    /// for every match.
    ///
    /// Pairs come back in glob enumeration order (alphabetical per
    /// directory); no further sorting is applied, so positional consistency
    /// rests on the derivation, not on comparing two listings.
    pub fn resolve(&self) -> Result<Vec<PairedSample>> {
        let matches = glob::glob(&self.seg_pattern)
            .with_context(|| format!("Invalid segmentation glob pattern {:?}", self.seg_pattern))?;
        let mut pairs = Vec::new();
        for entry in matches {
            let segmentation = entry.context("Failed to enumerate segmentation files")?;
            let seg_str = path_to_str(&segmentation)?;
            let volume = PathBuf::from(self.derive_volume_path(seg_str));
            pairs.push(PairedSample {
                volume,
                segmentation,
            });
        }
        Ok(pairs)
    }
}

/// Resolves the ordered pair list for a volume/segmentation pattern pair.
///
/// The segmentation enumeration is authoritative; volume paths are derived,
/// never globbed, so the two file sets stay positionally aligned by
/// construction.
pub fn resolve_pairs(vol_pattern: &str, seg_pattern: &str) -> Result<Vec<PairedSample>> {
    PatternPair::new(vol_pattern, seg_pattern)?.resolve()
}

/// Eagerly checks that both files of every pair exist.
///
/// Turns a broken naming convention into an immediate construction-time
/// error instead of a read failure mid-epoch. Not invoked implicitly.
pub fn verify_pairs(pairs: &[PairedSample]) -> Result<()> {
    for pair in pairs {
        ensure!(
            pair.segmentation.is_file(),
            "Segmentation file {} does not exist",
            pair.segmentation.display()
        );
        ensure!(
            pair.volume.is_file(),
            "Derived volume file {} does not exist (paired with {})",
            pair.volume.display(),
            pair.segmentation.display()
        );
    }
    Ok(())
}

fn split_on_marker(pattern: &str) -> Result<(String, String)> {
    let fragments: Vec<&str> = pattern.split(SPLIT_MARKER).collect();
    ensure!(
        fragments.len() == 2,
        "Pattern {:?} must contain the split marker {:?} exactly once (found {} occurrence(s))",
        pattern,
        SPLIT_MARKER,
        fragments.len().saturating_sub(1),
    );
    Ok((fragments[0].to_string(), fragments[1].to_string()))
}

fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path {:?} is not valid UTF-8", path))
}
