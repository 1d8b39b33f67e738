mod common;

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};

use mmf_core::error::MmfError;
use mmf_core::io::disk::partial_path;
use mmf_core::io::matrix::{MatrixFormat, MatrixReader};
use mmf_core::pipeline::Interrupt;
use mmf_core::reconstruct::transmission::{
    apply_rvitm, check_pair, correlate, estimate_rvitm, reconstruct_vector, two_stage, BlockPlan,
    RvitmOptions,
};

use common::{quiet, read_npy, write_npy};

const PIXELS: usize = 6;
const PATTERNS2: usize = 8;

fn fixtures() -> (Array2<i8>, Array2<i16>, Array1<f32>) {
    let xt = Array2::from_shape_fn((PATTERNS2, PIXELS), |(r, c)| {
        if (r * 5 + c * 3 + r * c) % 3 == 0 {
            1i8
        } else {
            -1
        }
    });
    let y = Array2::from_shape_fn((PIXELS, PATTERNS2), |(r, c)| {
        ((r * 37 + c * 91) % 511) as i16 - 255
    });
    let i_out = Array1::from_shape_fn(PIXELS, |p| (p * 41 % 256) as f32);
    (xt, y, i_out)
}

fn dense_reference(xt: &Array2<i8>, y: &Array2<i16>, i_out: &Array1<f32>) -> Array1<f32> {
    let xt = xt.mapv(f32::from);
    let y = y.mapv(f32::from);
    y.dot(&xt.dot(i_out)) / PATTERNS2 as f32
}

fn open(dir: &std::path::Path) -> (MatrixReader<i8>, MatrixReader<i16>, Array1<f32>, Array1<f32>) {
    let (xt, y, i_out) = fixtures();
    let reference = dense_reference(&xt, &y, &i_out);
    let a = write_npy(&dir.join("xt.npy"), &xt);
    let b = write_npy(&dir.join("y.npy"), &y);
    (
        MatrixReader::open(&a).unwrap(),
        MatrixReader::open(&b).unwrap(),
        i_out,
        reference,
    )
}

#[test]
fn test_two_stage_matches_dense_product() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, i_out, reference) = open(dir.path());
    let interrupt = Interrupt::new();

    for (corr, rec) in [(1, 1), (3, 4), (8, 6), (100, 100)] {
        let plan = BlockPlan {
            correlation_rows: corr,
            reconstruction_rows: rec,
        };
        let rec = two_stage(&xt, &y, i_out.view(), plan, quiet(&interrupt)).unwrap();
        assert_eq!(rec.len(), PIXELS);
        for (a, b) in rec.iter().zip(reference.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4 * b.abs().max(1.0));
        }
    }
}

#[test]
fn test_stages_compose() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, i_out, reference) = open(dir.path());
    let interrupt = Interrupt::new();

    let c = correlate(&xt, i_out.view(), 3, quiet(&interrupt)).unwrap();
    assert_eq!(c.len(), PATTERNS2);
    let rec = reconstruct_vector(&y, c.view(), 4, quiet(&interrupt)).unwrap();
    for (a, b) in rec.iter().zip(reference.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4 * b.abs().max(1.0));
    }
}

#[test]
fn test_budget_plan() {
    let mut warnings = Vec::new();
    let plan = BlockPlan::new(None, None, 1000, 50, 8000, &mut warnings);
    assert_eq!(plan.correlation_rows, 2);
    assert_eq!(plan.reconstruction_rows, 40);
    assert!(warnings.is_empty());

    let plan = BlockPlan::new(Some(7), None, 1000, 50, 8000, &mut warnings);
    assert_eq!(plan.correlation_rows, 7);
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_vector_length_is_checked() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, _, _, _) = open(dir.path());
    let interrupt = Interrupt::new();
    let short = Array1::<f32>::zeros(PIXELS - 1);

    let err = correlate(&xt, short.view(), 2, quiet(&interrupt)).err().unwrap();
    assert!(matches!(
        err,
        MmfError::ShapeMismatch {
            stage: "correlation",
            expected: PIXELS,
            actual: 5,
            ..
        }
    ));
}

#[test]
fn test_pair_shapes_are_checked() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, _, _, _) = open(dir.path());
    let wrong = write_npy(&dir.path().join("y7.npy"), &Array2::<i16>::zeros((PIXELS, 7)));
    let wrong = MatrixReader::<i16>::open(&wrong).unwrap();
    assert!(matches!(
        check_pair(&xt, &wrong).err().unwrap(),
        MmfError::ShapeMismatch {
            expected: PATTERNS2,
            actual: 7,
            ..
        }
    ));

    let odd = write_npy(&dir.path().join("x7.npy"), &Array2::<i8>::ones((7, PIXELS)));
    let odd = MatrixReader::<i8>::open(&odd).unwrap();
    assert!(matches!(
        check_pair(&odd, &wrong).err().unwrap(),
        MmfError::InvalidMatrix { .. }
    ));
}

// ---------------------------------------------------------------------------
// Full transmission matrix
// ---------------------------------------------------------------------------

fn rvitm_options(max_pixels: usize, budget_bytes: u64) -> RvitmOptions {
    RvitmOptions {
        max_pixels,
        budget_bytes,
        format: MatrixFormat::Npy,
        space_margin: 1.0,
    }
}

#[test]
fn test_rvitm_equals_scaled_product() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, _, _) = open(dir.path());
    let (xt_dense, y_dense, _) = fixtures();
    let out = dir.path().join("rvitm.npy");

    let interrupt = Interrupt::new();
    // 40 bytes holds a single f32 row of either operand.
    let summary =
        estimate_rvitm(&y, &xt, &out, &rvitm_options(64, 40), quiet(&interrupt)).unwrap();
    assert_eq!(summary.pixels, PIXELS);
    assert!(summary.row_blocks > 1);
    assert!(summary.col_blocks > 1);

    let expected = y_dense.mapv(f32::from).dot(&xt_dense.mapv(f32::from)) / PATTERNS2 as f32;
    let stored = read_npy::<f32>(&out);
    assert_eq!(stored.dim(), (PIXELS, PIXELS));
    for (a, b) in stored.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
}

#[test]
fn test_rvitm_path_agrees_with_two_stage() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, i_out, _) = open(dir.path());
    let out = dir.path().join("rvitm.npy");
    let interrupt = Interrupt::new();

    estimate_rvitm(&y, &xt, &out, &rvitm_options(64, 1 << 20), quiet(&interrupt)).unwrap();
    let rvitm = MatrixReader::<f32>::open(&out).unwrap();
    let full = apply_rvitm(&rvitm, i_out.view(), 4, quiet(&interrupt)).unwrap();

    let plan = BlockPlan {
        correlation_rows: 3,
        reconstruction_rows: 2,
    };
    let fast = two_stage(&xt, &y, i_out.view(), plan, quiet(&interrupt)).unwrap();
    for (a, b) in full.iter().zip(fast.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4 * b.abs().max(1.0));
    }
}

#[test]
fn test_rvitm_refuses_large_frames() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, _, _) = open(dir.path());
    let out = dir.path().join("rvitm.npy");

    let interrupt = Interrupt::new();
    let err = estimate_rvitm(&y, &xt, &out, &rvitm_options(5, 1 << 20), quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        MmfError::Infeasible {
            pixels: PIXELS,
            limit: 5
        }
    ));
    assert!(!out.exists());
    assert!(!partial_path(&out).exists());
}

#[test]
fn test_interrupted_rvitm_leaves_only_partial() {
    let dir = tempfile::tempdir().unwrap();
    let (xt, y, _, _) = open(dir.path());
    let out = dir.path().join("rvitm.npy");

    let interrupt = Interrupt::new();
    interrupt.trigger();
    let err = estimate_rvitm(&y, &xt, &out, &rvitm_options(64, 1 << 20), quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(err, MmfError::Interrupted { .. }));
    assert!(!out.exists());
    assert!(partial_path(&out).exists());
}
