mod common;

use std::path::Path;

use ndarray::{array, concatenate, Array2, Axis};

use mmf_core::error::{MmfError, Warning};
use mmf_core::io::matrix::{MatrixFormat, MatrixReader};
use mmf_core::matrix::concat::ConcatOptions;
use mmf_core::matrix::intensity::{
    baseline_transform, build_intensity_matrix, rebuild_from_temporaries, IntensityOptions,
    IntensityPaths,
};
use mmf_core::pipeline::Interrupt;

use common::{quiet, read_npy, write_npy};

fn paths(dir: &Path, tag: &str) -> IntensityPaths {
    IntensityPaths {
        temp_h1: dir.join(format!("{tag}_y1.npy")),
        temp_h2: dir.join(format!("{tag}_y2.npy")),
        baseline: dir.join(format!("{tag}_base.npy")),
        output: dir.join(format!("{tag}_y.npy")),
    }
}

fn options(transform_cols: usize, keep: bool) -> IntensityOptions {
    IntensityOptions {
        transform_cols,
        concat: ConcatOptions {
            chunk_rows: 2,
            progress_every: 1,
            format: MatrixFormat::Npy,
            space_margin: 1.0,
        },
        keep_temporaries: keep,
        min_range: 10,
    }
}

fn responses() -> (Array2<u8>, Array2<u8>) {
    let r1 = Array2::from_shape_fn((6, 4), |(p, i)| ((p * 40 + i * 13) % 256) as u8);
    let r2 = Array2::from_shape_fn((6, 4), |(p, i)| (255 - (p * 31 + i * 7) % 256) as u8);
    (r1, r2)
}

fn open_responses(dir: &Path) -> (MatrixReader<u8>, MatrixReader<u8>, Array2<u8>, Array2<u8>) {
    let (r1, r2) = responses();
    let a = write_npy(&dir.join("r1.npy"), &r1);
    let b = write_npy(&dir.join("r2.npy"), &r2);
    (
        MatrixReader::open(&a).unwrap(),
        MatrixReader::open(&b).unwrap(),
        r1,
        r2,
    )
}

fn expected_y(r1: &Array2<u8>, r2: &Array2<u8>) -> Array2<i16> {
    let base = r1.column(0).mapv(i16::from);
    let shift = |r: &Array2<u8>| {
        let mut y = r.mapv(|v| 2 * i16::from(v));
        for (mut row, b) in y.rows_mut().into_iter().zip(base.iter()) {
            row -= *b;
        }
        y
    };
    concatenate(Axis(1), &[shift(r1).view(), shift(r2).view()]).unwrap()
}

#[test]
fn test_y_is_twice_response_minus_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, m2, r1, r2) = open_responses(dir.path());
    let p = paths(dir.path(), "a");

    let interrupt = Interrupt::new();
    let summary = build_intensity_matrix(&m1, &m2, &p, &options(3, false), quiet(&interrupt)).unwrap();
    assert_eq!((summary.rows, summary.cols), (6, 8));

    let y = read_npy::<i16>(&p.output);
    assert_eq!(y, expected_y(&r1, &r2));

    let base = read_npy::<i16>(&p.baseline);
    assert_eq!(base.dim(), (6, 1));
    assert_eq!(base.column(0), r1.column(0).mapv(i16::from));
    // Column 0 of the H1 half is 2·I¹ − I¹ = I¹.
    assert!(y.column(0).iter().zip(r1.column(0)).all(|(&v, &b)| v == i16::from(b)));

    assert!(!p.temp_h1.exists());
    assert!(!p.temp_h2.exists());
}

#[test]
fn test_transform_width_does_not_change_result() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, m2, _, _) = open_responses(dir.path());
    let interrupt = Interrupt::new();

    let mut outputs = Vec::new();
    for (tag, cols) in [("w1", 1), ("w3", 3), ("w4", 4), ("w9", 9)] {
        let p = paths(dir.path(), tag);
        build_intensity_matrix(&m1, &m2, &p, &options(cols, false), quiet(&interrupt)).unwrap();
        outputs.push(std::fs::read(&p.output).unwrap());
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_extreme_samples_stay_in_range() {
    let dir = tempfile::tempdir().unwrap();
    let r1 = array![[0u8, 255], [255, 0]];
    let r2 = array![[255u8, 0], [0, 255]];
    let m1 = MatrixReader::open(&write_npy(&dir.path().join("r1.npy"), &r1)).unwrap();
    let m2 = MatrixReader::open(&write_npy(&dir.path().join("r2.npy"), &r2)).unwrap();
    let p = paths(dir.path(), "x");

    let interrupt = Interrupt::new();
    build_intensity_matrix(&m1, &m2, &p, &options(1, false), quiet(&interrupt)).unwrap();

    let y = read_npy::<i16>(&p.output);
    assert_eq!(y, array![[0i16, 510, 510, 0], [255, -255, -255, 255]]);
}

#[test]
fn test_flat_responses_are_suspicious() {
    let dir = tempfile::tempdir().unwrap();
    let flat = Array2::<u8>::from_elem((4, 4), 100);
    let m1 = MatrixReader::open(&write_npy(&dir.path().join("r1.npy"), &flat)).unwrap();
    let m2 = MatrixReader::open(&write_npy(&dir.path().join("r2.npy"), &flat)).unwrap();
    let p = paths(dir.path(), "f");

    let interrupt = Interrupt::new();
    let summary = build_intensity_matrix(&m1, &m2, &p, &options(2, false), quiet(&interrupt)).unwrap();
    assert_eq!(summary.range, (100, 100));
    assert_eq!(
        summary.warnings,
        vec![Warning::SuspiciousIntensityRange { min: 100, max: 100 }]
    );
}

#[test]
fn test_recovery_from_temporaries() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, m2, r1, r2) = open_responses(dir.path());
    let p = paths(dir.path(), "k");

    let interrupt = Interrupt::new();
    build_intensity_matrix(&m1, &m2, &p, &options(2, true), quiet(&interrupt)).unwrap();
    assert!(p.temp_h1.exists() && p.temp_h2.exists());
    let original = std::fs::read(&p.output).unwrap();
    std::fs::remove_file(&p.output).unwrap();

    let summary = rebuild_from_temporaries(&p, 6, 4, &options(2, false), quiet(&interrupt)).unwrap();
    assert_eq!(summary.cols, 8);
    assert_eq!(std::fs::read(&p.output).unwrap(), original);
    assert_eq!(read_npy::<i16>(&p.output), expected_y(&r1, &r2));
    assert!(!p.temp_h1.exists());
}

#[test]
fn test_recovery_requires_baseline_and_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, m2, _, _) = open_responses(dir.path());
    let p = paths(dir.path(), "r");
    let interrupt = Interrupt::new();
    build_intensity_matrix(&m1, &m2, &p, &options(2, true), quiet(&interrupt)).unwrap();

    let err = rebuild_from_temporaries(&p, 6, 5, &options(2, true), quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(err, MmfError::ShapeMismatch { .. }));

    std::fs::remove_file(&p.baseline).unwrap();
    let err = rebuild_from_temporaries(&p, 6, 4, &options(2, true), quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(err, MmfError::MissingFile(_)));
}

#[test]
fn test_baseline_length_must_match() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, _, _, _) = open_responses(dir.path());
    let short = ndarray::Array1::<i16>::zeros(5);

    let interrupt = Interrupt::new();
    let err = baseline_transform(
        &m1,
        short.view(),
        &dir.path().join("t.npy"),
        2,
        MatrixFormat::Npy,
        1.0,
        quiet(&interrupt),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        MmfError::ShapeMismatch {
            expected: 6,
            actual: 5,
            ..
        }
    ));
}

#[test]
fn test_mismatched_response_sets_fail_before_output() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, _, _, _) = open_responses(dir.path());
    let other = write_npy(&dir.path().join("r3.npy"), &Array2::<u8>::zeros((6, 3)));
    let m3 = MatrixReader::<u8>::open(&other).unwrap();
    let p = paths(dir.path(), "m");

    let interrupt = Interrupt::new();
    assert!(build_intensity_matrix(&m1, &m3, &p, &options(2, false), quiet(&interrupt)).is_err());
    assert!(!p.output.exists());
    assert!(!p.baseline.exists());
}

#[test]
fn test_space_is_checked_for_whole_stage_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let (m1, m2, _, _) = open_responses(dir.path());
    let p = paths(dir.path(), "s");
    std::fs::write(&p.output, b"stale").unwrap();

    let mut opts = options(2, true);
    opts.concat.space_margin = 1e15;
    let interrupt = Interrupt::new();
    let err = build_intensity_matrix(&m1, &m2, &p, &opts, quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(err, MmfError::InsufficientSpace { .. }));

    assert!(!p.baseline.exists());
    assert!(!p.temp_h1.exists());
    assert!(!p.temp_h2.exists());
    // Nothing is removed before the check passes.
    assert_eq!(std::fs::read(&p.output).unwrap(), b"stale");
}
