//! Pairing and paired-augmentation contracts for `AugmentGenerator`.

mod common;

use anyhow::Result;
use ndarray::Axis;
use tempfile::TempDir;
use volume_prep::{
    io, stack_batch, transform, AugmentConfig, AugmentGenerator, FillMode, PreprocessOp,
    Preprocessor, TransformParams, Transformer,
};

const SHAPE: [usize; 3] = [4, 4, 4];

fn generator_over(dir: &TempDir, n: usize, batch_size: usize) -> Result<AugmentGenerator> {
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), n, &SHAPE)?;
    AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        batch_size,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )
}

#[test]
fn test_len_counts_pairs_not_files() -> Result<()> {
    let dir = TempDir::new()?;
    let gen = generator_over(&dir, 10, 4)?;
    assert_eq!(gen.num_samples(), 10);
    assert_eq!(gen.len(), 3);
    assert_eq!(gen.pairs().len(), 10);
    Ok(())
}

#[test]
fn test_batch_shapes_are_paired_and_partial_at_tail() -> Result<()> {
    let dir = TempDir::new()?;
    let mut gen = generator_over(&dir, 5, 2)?;

    let full = gen.batch_at(0)?;
    assert_eq!(full.volumes.shape(), &[2, 4, 4, 4]);
    assert_eq!(full.segmentations.shape(), &[2, 4, 4, 4]);
    assert_eq!(full.batch_size(), 2);

    let tail = gen.batch_at(2)?;
    assert_eq!(tail.volumes.shape(), &[1, 4, 4, 4]);
    assert_eq!(tail.segmentations.shape(), &[1, 4, 4, 4]);
    assert_eq!(tail.batch_size(), 1);
    Ok(())
}

#[test]
fn test_out_of_range_index_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let mut gen = generator_over(&dir, 5, 2)?;
    let err = gen.batch_at(3).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");
    Ok(())
}

#[test]
fn test_invalid_config_fails_at_construction() -> Result<()> {
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), 2, &SHAPE)?;

    let bad_zoom = AugmentConfig::builder().zoom_range(1.5).build();
    assert!(AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        bad_zoom,
    )
    .is_err());

    let bad_rotation = AugmentConfig::builder().rotation_range(-10.0).build();
    assert!(AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        bad_rotation,
    )
    .is_err());

    assert!(AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        0,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )
    .is_err());
    Ok(())
}

#[test]
fn test_bad_marker_arity_fails_at_construction() -> Result<()> {
    let dir = TempDir::new()?;
    let (_, seg_pattern) = common::write_paired_tree(dir.path(), 2, &SHAPE)?;

    let no_marker = format!("{}/vol/all.nii.gz", dir.path().display());
    assert!(AugmentGenerator::new(
        &no_marker,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )
    .is_err());
    Ok(())
}

#[test]
fn test_missing_derived_volume_fails_at_construction() -> Result<()> {
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), 3, &SHAPE)?;
    std::fs::remove_file(dir.path().join("vol/case01/case01_t2.nii.gz"))?;

    let err = AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("case01"), "{err:#}");
    Ok(())
}

#[test]
fn test_volume_and_mask_share_each_draw() -> Result<()> {
    // Mirrored fixtures: segmentation files equal their volumes, so after a
    // shared draw the augmented batches must stay equal too, with every
    // augmentation class active.
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_mirrored_tree(dir.path(), 4, &SHAPE)?;
    let mut gen = AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )?;

    for index in 0..gen.len() {
        let batch = gen.batch_at(index)?;
        assert_eq!(batch.volumes, batch.segmentations);
    }
    Ok(())
}

#[test]
fn test_same_seed_reproduces_batches() -> Result<()> {
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), 4, &SHAPE)?;
    let make = || -> Result<AugmentGenerator> {
        Ok(AugmentGenerator::new(
            &vol_pattern,
            &seg_pattern,
            2,
            Preprocessor::new(SHAPE),
            AugmentConfig::default(),
        )?
        .with_seed(42))
    };

    let mut a = make()?;
    let mut b = make()?;

    // Matching draw positions give matching batches, also on re-request.
    for index in [0usize, 1, 0, 0, 1] {
        let left = a.batch_at(index)?;
        let right = b.batch_at(index)?;
        assert_eq!(left.volumes, right.volumes);
        assert_eq!(left.segmentations, right.segmentations);
    }
    Ok(())
}

#[test]
fn test_repeated_index_draws_fresh_parameters() -> Result<()> {
    // The generator never memoizes: the second request for index 0 must use
    // the third and fourth draws of the seeded stream, not a replay of the
    // first two. Reconstruct that batch from a twin transformer and compare.
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), 2, &SHAPE)?;
    let mut gen = AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )?
    .with_seed(7);

    let _first = gen.batch_at(0)?;
    let second = gen.batch_at(0)?;

    let mut twin = Transformer::seeded(AugmentConfig::default(), 7)?;
    let replayed: Vec<TransformParams> = (0..2).map(|_| twin.draw(&SHAPE)).collect();

    let pre = Preprocessor::new(SHAPE);
    let ops = [PreprocessOp::Resize];
    let mut expected_vols = Vec::new();
    let mut expected_segs = Vec::new();
    let mut fresh = Vec::new();
    for pair in gen.pairs() {
        let vol = pre.preprocess(&pair.volume, &ops)?;
        let seg = pre.preprocess(&pair.segmentation, &ops)?;
        let params = twin.draw(&SHAPE);
        expected_vols.push(transform::apply(&params, &vol, FillMode::Nearest, 0.0)?);
        expected_segs.push(transform::apply(&params, &seg, FillMode::Nearest, 0.0)?);
        fresh.push(params);
    }

    assert_ne!(replayed, fresh);
    assert_eq!(second.volumes, stack_batch(&expected_vols)?);
    assert_eq!(second.segmentations, stack_batch(&expected_segs)?);
    Ok(())
}

#[test]
fn test_epoch_iterator_covers_all_batches() -> Result<()> {
    let dir = TempDir::new()?;
    let mut gen = generator_over(&dir, 5, 2)?;

    let sizes: Vec<usize> = gen
        .batches()
        .map(|batch| Ok(batch?.batch_size()))
        .collect::<Result<_>>()?;
    assert_eq!(sizes, vec![2, 2, 1]);
    Ok(())
}

#[test]
fn test_save_to_dir_writes_inspectable_pairs() -> Result<()> {
    let dir = TempDir::new()?;
    let save = dir.path().join("augmented");
    let (vol_pattern, seg_pattern) = common::write_paired_tree(dir.path(), 2, &SHAPE)?;
    let mut gen = AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        2,
        Preprocessor::new(SHAPE),
        AugmentConfig::default(),
    )?
    .save_to_dir(&save)?;

    let batch = gen.batch_at(0)?;

    let mut names: Vec<String> = std::fs::read_dir(&save)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
        .collect::<Result<_>>()?;
    names.sort();
    assert_eq!(
        names,
        vec![
            "seg_0_0.nii.gz",
            "seg_1_1.nii.gz",
            "vol_0_0.nii.gz",
            "vol_1_1.nii.gz",
        ]
    );

    // Saved files hold exactly what the batch returned.
    let saved_vol = io::read_volume(save.join("vol_0_0.nii.gz"))?;
    assert_eq!(saved_vol, batch.volumes.index_axis(Axis(0), 0).to_owned());
    let saved_seg = io::read_volume(save.join("seg_1_1.nii.gz"))?;
    assert_eq!(saved_seg, batch.segmentations.index_axis(Axis(0), 1).to_owned());
    Ok(())
}

#[test]
fn test_constant_fill_uses_configured_value() -> Result<()> {
    // Large shifts with constant fill must introduce the fill value and
    // nothing else from outside the volume's original intensity range.
    let dir = TempDir::new()?;
    let (vol_pattern, seg_pattern) = common::write_mirrored_tree(dir.path(), 1, &SHAPE)?;
    let config = AugmentConfig::builder()
        .rotation_range(0.0)
        .shift_range(0.9)
        .shear_range(0.0)
        .zoom_range(0.0)
        .flip(false)
        .fill_mode(FillMode::Constant)
        .fill_value(-7.0)
        .build();
    let mut gen = AugmentGenerator::new(
        &vol_pattern,
        &seg_pattern,
        1,
        Preprocessor::new(SHAPE),
        config,
    )?
    .with_seed(3);

    let batch = gen.batch_at(0)?;
    for &v in batch.volumes.iter() {
        assert!(v == -7.0 || (0.0..=63.0).contains(&v), "unexpected voxel {v}");
    }
    Ok(())
}
