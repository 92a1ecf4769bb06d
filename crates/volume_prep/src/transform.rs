//! src/transform.rs
//!
//! Randomized 3D geometric augmentation.
//!
//! A [`Transformer`] draws one [`TransformParams`] per sample (rotation,
//! shift, shear, zoom, flips) and applies the identical mapping to a volume
//! and its segmentation mask. The shared draw is what keeps the pair
//! aligned: drawing twice would rotate the scan and its labels differently.
//!
//! # Example
//! ```ignore
//! let config = AugmentConfig::builder()
//!     .rotation_range(15.0)
//!     .zoom_range(0.1)
//!     .build();
//! let mut transformer = Transformer::seeded(config, 42)?;
//! let (vol_aug, seg_aug) = transformer.transform_pair(&vol, &seg)?;
//! ```

use anyhow::{bail, ensure, Context, Result};
use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FillMode
// ============================================================================

/// How resampling resolves source coordinates that fall outside the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Clamp to the nearest edge voxel.
    #[default]
    Nearest,
    /// Use a constant fill value.
    Constant,
    /// Mirror across the volume boundary.
    Reflect,
    /// Wrap around to the opposite side.
    Wrap,
}

impl FillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::Nearest => "nearest",
            FillMode::Constant => "constant",
            FillMode::Reflect => "reflect",
            FillMode::Wrap => "wrap",
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest" => Ok(FillMode::Nearest),
            "constant" => Ok(FillMode::Constant),
            "reflect" => Ok(FillMode::Reflect),
            "wrap" => Ok(FillMode::Wrap),
            other => bail!(
                "Unsupported fill mode {:?} (expected one of: nearest, constant, reflect, wrap)",
                other
            ),
        }
    }
}

// ============================================================================
// AugmentConfig
// ============================================================================

/// Randomized-augmentation parameters.
///
/// Defaults are tuned for brain-MRI training: generous rotation, mild
/// shift/shear/zoom, nearest-neighbour fill, flips enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Maximum rotation per axis in degrees; angles drawn from the symmetric
    /// range `±rotation_range`.
    pub rotation_range: f32,
    /// Maximum shift per axis as a fraction of that axis' extent.
    pub shift_range: f32,
    /// Maximum absolute shear coefficient.
    pub shear_range: f32,
    /// Per-axis zoom factors drawn from `[1 - zoom_range, 1 + zoom_range]`.
    pub zoom_range: f32,
    /// Boundary handling for out-of-grid source coordinates.
    pub fill_mode: FillMode,
    /// Fill value used by [`FillMode::Constant`].
    pub fill_value: f32,
    /// Whether each axis is reversed with probability 0.5.
    pub flip: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation_range: 90.0,
            shift_range: 0.1,
            shear_range: 0.2,
            zoom_range: 0.2,
            fill_mode: FillMode::Nearest,
            fill_value: 0.0,
            flip: true,
        }
    }
}

impl AugmentConfig {
    pub fn builder() -> AugmentConfigBuilder {
        AugmentConfigBuilder::default()
    }

    /// Checks the parameter ranges.
    ///
    /// [`Transformer`] construction (and with it generator construction)
    /// runs this, so a bad config fails before any data is touched.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.rotation_range >= 0.0,
            "rotation_range must be >= 0 (got {})",
            self.rotation_range
        );
        ensure!(
            self.shift_range >= 0.0,
            "shift_range must be >= 0 (got {})",
            self.shift_range
        );
        ensure!(
            self.shear_range >= 0.0,
            "shear_range must be >= 0 (got {})",
            self.shear_range
        );
        ensure!(
            (0.0..1.0).contains(&self.zoom_range),
            "zoom_range must be in [0, 1) so zoom factors stay positive (got {})",
            self.zoom_range
        );
        ensure!(
            self.fill_value.is_finite(),
            "fill_value must be finite (got {})",
            self.fill_value
        );
        Ok(())
    }
}

/// Builder for [`AugmentConfig`] with method chaining.
///
/// Unset fields keep their defaults; validation happens when a
/// [`Transformer`] or generator is constructed, not in `build()`.
#[derive(Default)]
pub struct AugmentConfigBuilder {
    config: AugmentConfig,
}

impl AugmentConfigBuilder {
    /// Set the maximum rotation per axis, in degrees.
    pub fn rotation_range(mut self, degrees: f32) -> Self {
        self.config.rotation_range = degrees;
        self
    }

    /// Set the maximum shift per axis, as a fraction of the axis extent.
    pub fn shift_range(mut self, fraction: f32) -> Self {
        self.config.shift_range = fraction;
        self
    }

    /// Set the maximum absolute shear coefficient.
    pub fn shear_range(mut self, shear: f32) -> Self {
        self.config.shear_range = shear;
        self
    }

    /// Set the zoom half-range; factors are drawn from `[1 - z, 1 + z]`.
    pub fn zoom_range(mut self, zoom: f32) -> Self {
        self.config.zoom_range = zoom;
        self
    }

    /// Set the boundary fill mode.
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.config.fill_mode = mode;
        self
    }

    /// Set the constant fill value (only used with [`FillMode::Constant`]).
    pub fn fill_value(mut self, value: f32) -> Self {
        self.config.fill_value = value;
        self
    }

    /// Enable or disable random axis flips.
    pub fn flip(mut self, flip: bool) -> Self {
        self.config.flip = flip;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> AugmentConfig {
        self.config
    }
}

// ============================================================================
// TransformParams
// ============================================================================

/// One drawn parameter set.
///
/// Applying the same params to a volume and to its mask produces congruent
/// outputs; that is the whole point of separating the draw from the apply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    /// Rotation angles about the three axes, in radians.
    pub angles: [f32; 3],
    /// Translation per axis, in voxels.
    pub shifts: [f32; 3],
    /// Shear coefficients filling the upper triangle of the shear matrix.
    pub shears: [f32; 3],
    /// Per-axis scale factors.
    pub zooms: [f32; 3],
    /// Axes to mirror.
    pub flips: [bool; 3],
}

impl TransformParams {
    /// Identity parameters; applying them returns the input unchanged.
    pub fn identity() -> Self {
        Self {
            angles: [0.0; 3],
            shifts: [0.0; 3],
            shears: [0.0; 3],
            zooms: [1.0; 3],
            flips: [false; 3],
        }
    }
}

// ============================================================================
// Transformer
// ============================================================================

/// Draws random parameter sets and applies them to volume/mask pairs.
#[derive(Debug)]
pub struct Transformer {
    config: AugmentConfig,
    rng: StdRng,
}

impl Transformer {
    /// Validates the config and seeds the parameter stream from entropy.
    pub fn new(config: AugmentConfig) -> Result<Self> {
        let seed = rand::rng().random();
        Self::seeded(config, seed)
    }

    /// Validates the config and seeds the parameter stream explicitly.
    ///
    /// Two transformers with the same config and seed draw identical
    /// parameter sequences.
    pub fn seeded(config: AugmentConfig, seed: u64) -> Result<Self> {
        config
            .validate()
            .context("Invalid augmentation configuration")?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Resets the parameter stream to a known seed.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Draws one fresh parameter set for a volume of the given shape.
    ///
    /// Shifts scale with the axis extents, so the same config shifts a
    /// 128-voxel axis further than a 32-voxel one.
    pub fn draw(&mut self, shape: &[usize]) -> TransformParams {
        let mut params = TransformParams::identity();
        for axis in 0..3 {
            if self.config.rotation_range > 0.0 {
                let degrees = self
                    .rng
                    .random_range(-self.config.rotation_range..=self.config.rotation_range);
                params.angles[axis] = degrees.to_radians();
            }
            if self.config.shift_range > 0.0 {
                let extent = shape.get(axis).copied().unwrap_or(1) as f32;
                let fraction = self
                    .rng
                    .random_range(-self.config.shift_range..=self.config.shift_range);
                params.shifts[axis] = fraction * extent;
            }
            if self.config.shear_range > 0.0 {
                params.shears[axis] = self
                    .rng
                    .random_range(-self.config.shear_range..=self.config.shear_range);
            }
            if self.config.zoom_range > 0.0 {
                params.zooms[axis] = self
                    .rng
                    .random_range(1.0 - self.config.zoom_range..=1.0 + self.config.zoom_range);
            }
            if self.config.flip {
                params.flips[axis] = self.rng.random_bool(0.5);
            }
        }
        params
    }

    /// Draws a single parameter set and applies it to both members.
    ///
    /// The arrays must have identical shape. Every call advances the
    /// parameter stream; nothing is cached.
    pub fn transform_pair(
        &mut self,
        volume: &ArrayD<f32>,
        segmentation: &ArrayD<f32>,
    ) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
        ensure!(
            volume.shape() == segmentation.shape(),
            "Volume and segmentation shapes differ ({:?} vs {:?})",
            volume.shape(),
            segmentation.shape()
        );
        let params = self.draw(volume.shape());
        let vol = apply(&params, volume, self.config.fill_mode, self.config.fill_value)?;
        let seg = apply(&params, segmentation, self.config.fill_mode, self.config.fill_value)?;
        Ok((vol, seg))
    }
}

// ============================================================================
// Resampling
// ============================================================================

type Mat3 = [[f32; 3]; 3];

/// Applies one parameter set to a 3-d volume.
///
/// The affine matrix maps each output voxel back into the source grid,
/// centered on the volume, and the source is looked up nearest-neighbour so
/// label masks stay label-valued. Flipped axes are mirrored in the result;
/// out-of-grid source coordinates resolve per `fill_mode`.
pub fn apply(
    params: &TransformParams,
    volume: &ArrayD<f32>,
    fill_mode: FillMode,
    fill_value: f32,
) -> Result<ArrayD<f32>> {
    ensure!(
        volume.ndim() == 3,
        "Transform expects a 3-d volume, got {} dimension(s)",
        volume.ndim()
    );
    ensure!(
        volume.shape().iter().all(|&d| d > 0),
        "Cannot transform an empty volume (shape {:?})",
        volume.shape()
    );

    let shape = [volume.shape()[0], volume.shape()[1], volume.shape()[2]];
    let center = [
        (shape[0] as f32 - 1.0) * 0.5,
        (shape[1] as f32 - 1.0) * 0.5,
        (shape[2] as f32 - 1.0) * 0.5,
    ];
    let matrix = affine_matrix(params);

    let mut out = ArrayD::zeros(volume.raw_dim());
    for i in 0..shape[0] {
        let oi = if params.flips[0] { shape[0] - 1 - i } else { i };
        let d0 = oi as f32 - center[0];
        for j in 0..shape[1] {
            let oj = if params.flips[1] { shape[1] - 1 - j } else { j };
            let d1 = oj as f32 - center[1];
            for k in 0..shape[2] {
                let ok = if params.flips[2] { shape[2] - 1 - k } else { k };
                let d2 = ok as f32 - center[2];

                let src = [
                    matrix[0][0] * d0 + matrix[0][1] * d1 + matrix[0][2] * d2
                        + center[0]
                        + params.shifts[0],
                    matrix[1][0] * d0 + matrix[1][1] * d1 + matrix[1][2] * d2
                        + center[1]
                        + params.shifts[1],
                    matrix[2][0] * d0 + matrix[2][1] * d1 + matrix[2][2] * d2
                        + center[2]
                        + params.shifts[2],
                ];
                out[[i, j, k]] = sample(volume, &shape, src, fill_mode, fill_value);
            }
        }
    }
    Ok(out)
}

/// Composes rotation, shear and zoom into one output-to-source matrix.
fn affine_matrix(params: &TransformParams) -> Mat3 {
    let [a0, a1, a2] = params.angles;
    let (s0, c0) = a0.sin_cos();
    let (s1, c1) = a1.sin_cos();
    let (s2, c2) = a2.sin_cos();

    let r0: Mat3 = [[1.0, 0.0, 0.0], [0.0, c0, -s0], [0.0, s0, c0]];
    let r1: Mat3 = [[c1, 0.0, s1], [0.0, 1.0, 0.0], [-s1, 0.0, c1]];
    let r2: Mat3 = [[c2, -s2, 0.0], [s2, c2, 0.0], [0.0, 0.0, 1.0]];
    let rotation = mat_mul(&mat_mul(&r0, &r1), &r2);

    let [h0, h1, h2] = params.shears;
    let shear: Mat3 = [[1.0, h0, h1], [0.0, 1.0, h2], [0.0, 0.0, 1.0]];

    let [z0, z1, z2] = params.zooms;
    let zoom: Mat3 = [[z0, 0.0, 0.0], [0.0, z1, 0.0], [0.0, 0.0, z2]];

    mat_mul(&mat_mul(&rotation, &shear), &zoom)
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut m = [[0.0f32; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            m[r][c] = a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c];
        }
    }
    m
}

fn sample(
    volume: &ArrayD<f32>,
    shape: &[usize; 3],
    src: [f32; 3],
    fill_mode: FillMode,
    fill_value: f32,
) -> f32 {
    let mut idx = [0usize; 3];
    for axis in 0..3 {
        let dim = shape[axis] as isize;
        let pos = src[axis].round() as isize;
        let resolved = match fill_mode {
            FillMode::Constant => {
                if pos < 0 || pos >= dim {
                    return fill_value;
                }
                pos
            }
            FillMode::Nearest => pos.clamp(0, dim - 1),
            FillMode::Reflect => reflect_index(pos, dim),
            FillMode::Wrap => pos.rem_euclid(dim),
        };
        idx[axis] = resolved as usize;
    }
    volume[[idx[0], idx[1], idx[2]]]
}

/// Mirrors an index into `[0, dim)`, edge voxels included
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(pos: isize, dim: isize) -> isize {
    if dim == 1 {
        return 0;
    }
    let period = 2 * dim;
    let mut p = pos.rem_euclid(period);
    if p >= dim {
        p = period - 1 - p;
    }
    p
}
