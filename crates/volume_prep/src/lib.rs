//! Batched preparation of paired 3D volumes and segmentation masks.
//!
//! The crate pairs raw scans with their masks by filename convention,
//! normalizes them to a common shape, and serves them as fixed-size batches:
//! randomly augmented pairs for training ([`AugmentGenerator`]) or plain
//! streamed volumes for inference ([`VolumeGenerator`]). See the
//! [`generator`] module docs for the architecture.

pub mod generator;
pub mod io;
pub mod pairing;
pub mod preprocess;
pub mod transform;

pub use generator::{
    stack_batch, AugmentBatches, AugmentGenerator, VolSegBatch, VolumeGenerator, VolumeStream,
};
pub use pairing::{resolve_pairs, verify_pairs, PairedSample, PatternPair, SPLIT_MARKER};
pub use preprocess::{PreprocessOp, Preprocessor};
pub use transform::{AugmentConfig, AugmentConfigBuilder, FillMode, TransformParams, Transformer};
