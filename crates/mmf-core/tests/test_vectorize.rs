mod common;

use ndarray::{array, Array2};

use mmf_core::error::{MmfError, Warning};
use mmf_core::frame::FrameShape;
use mmf_core::io::disk::partial_path;
use mmf_core::io::frames::{check_pairing, list_frames};
use mmf_core::io::matrix::MatrixFormat;
use mmf_core::matrix::vectorize::{vectorize_dir, vectorize_images, SampleMode, VectorizeOptions};
use mmf_core::pipeline::Interrupt;

use common::{quiet, read_npy, write_frames, write_png};

fn options(shape: FrameShape, mode: SampleMode, chunk: usize) -> VectorizeOptions {
    VectorizeOptions {
        shape,
        mode,
        chunk_images: chunk,
        expected_count: None,
        format: MatrixFormat::Npy,
        space_margin: 1.0,
    }
}

fn four_images() -> Vec<Array2<u8>> {
    vec![
        array![[1u8, 2], [3, 4]],
        array![[10u8, 20], [30, 40]],
        array![[0u8, 255], [128, 127]],
        array![[9u8, 8], [7, 6]],
    ]
}

#[test]
fn test_columns_are_raster_flattened_images() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, "img", 0, &four_images());
    let out = dir.path().join("v.npy");

    let interrupt = Interrupt::new();
    let opts = options(FrameShape::new(2, 2), SampleMode::Raw, 3);
    let summary = vectorize_dir(&frames, &out, &opts, quiet(&interrupt)).unwrap();
    assert_eq!((summary.rows, summary.cols), (4, 4));
    assert!(summary.warnings.is_empty());

    let expected = array![
        [1u8, 10, 0, 9],
        [2, 20, 255, 8],
        [3, 30, 128, 7],
        [4, 40, 127, 6]
    ];
    assert_eq!(read_npy::<u8>(&out), expected);
}

#[test]
fn test_chunk_size_does_not_change_result() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let paths = write_frames(&frames, "img", 0, &four_images());
    let interrupt = Interrupt::new();
    let shape = FrameShape::new(2, 2);

    let mut outputs = Vec::new();
    for chunk in [1, 3, 4, 64] {
        let out = dir.path().join(format!("v{chunk}.npy"));
        vectorize_images(&paths, &out, &options(shape, SampleMode::Raw, chunk), quiet(&interrupt))
            .unwrap();
        outputs.push(std::fs::read(&out).unwrap());
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_binarize_uses_strict_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let paths = write_frames(&frames, "img", 0, &four_images());
    let out = dir.path().join("b.npy");

    let interrupt = Interrupt::new();
    let opts = options(FrameShape::new(2, 2), SampleMode::Binarize(127), 2);
    vectorize_images(&paths[2..3], &out, &opts, quiet(&interrupt)).unwrap();

    assert_eq!(read_npy::<u8>(&out), array![[0u8], [1], [1], [0]]);
}

#[test]
fn test_wrong_size_image_fails_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let mut paths = write_frames(&frames, "img", 0, &four_images());
    let odd = frames.join("img_4.png");
    write_png(&odd, &Array2::<u8>::zeros((3, 2)));
    paths.push(odd.clone());
    let out = dir.path().join("v.npy");

    let interrupt = Interrupt::new();
    let opts = options(FrameShape::new(2, 2), SampleMode::Raw, 2);
    let err = vectorize_images(&paths, &out, &opts, quiet(&interrupt))
        .err()
        .unwrap();

    assert!(err.to_string().contains("img_4.png"));
    match err {
        MmfError::ImageShapeMismatch {
            path,
            expected_height,
            actual_height,
            ..
        } => {
            assert_eq!(path, odd);
            assert_eq!((expected_height, actual_height), (2, 3));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
    assert!(!partial_path(&out).exists());
}

#[test]
fn test_pattern_count_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let images: Vec<_> = four_images().into_iter().take(3).collect();
    let paths = write_frames(&frames, "img", 0, &images);
    let out = dir.path().join("p.npy");

    let interrupt = Interrupt::new();
    let mut opts = options(FrameShape::new(2, 2), SampleMode::Binarize(127), 2);
    opts.expected_count = Some(4);
    let summary = vectorize_images(&paths, &out, &opts, quiet(&interrupt)).unwrap();

    assert_eq!(
        summary.warnings,
        vec![
            Warning::NonPowerOfTwoPatterns { count: 3 },
            Warning::PatternOrderMismatch {
                expected: 4,
                actual: 3
            },
        ]
    );
    assert!(out.exists());
}

#[test]
fn test_interrupt_stops_before_first_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    let paths = write_frames(&frames, "img", 0, &four_images());
    let out = dir.path().join("v.npy");

    let interrupt = Interrupt::new();
    interrupt.trigger();
    let opts = options(FrameShape::new(2, 2), SampleMode::Raw, 2);
    let err = vectorize_images(&paths, &out, &opts, quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(err, MmfError::Interrupted { stage: "vectorization" }));
    assert!(!out.exists());
}

#[test]
fn test_sets_pair_by_position() {
    let dir = tempfile::tempdir().unwrap();
    let h1 = dir.path().join("h1");
    let h2 = dir.path().join("h2");
    write_frames(&h1, "speckle", 0, &four_images());
    write_frames(&h2, "speckle", 4, &four_images());

    let a = list_frames(&h1).unwrap();
    let b = list_frames(&h2).unwrap();
    assert_eq!(b.indices, Some(vec![4, 5, 6, 7]));
    check_pairing("speckles", &a, &b).unwrap();

    std::fs::remove_file(h2.join("speckle_7.png")).unwrap();
    let b = list_frames(&h2).unwrap();
    let err = check_pairing("speckles", &a, &b).err().unwrap();
    assert!(matches!(
        err,
        MmfError::CountMismatch {
            left: 4,
            right: 3,
            ..
        }
    ));
}
