mod common;

use mmf_core::error::MmfError;
use mmf_core::frame::FrameShape;
use mmf_core::hadamard::generate::pattern_file_name;
use mmf_core::hadamard::{save_patterns, sylvester_entry, PatternLayout, PatternSet};
use mmf_core::io::frames::list_frames;
use mmf_core::io::image_io::load_gray;
use mmf_core::pipeline::Interrupt;

use common::quiet;

#[test]
fn test_saved_patterns_round_trip_through_listing() {
    let dir = tempfile::tempdir().unwrap();
    let layout = PatternLayout::new(4, FrameShape::new(8, 12)).unwrap();
    let interrupt = Interrupt::new();

    for set in [PatternSet::H1, PatternSet::H2] {
        let out = dir.path().join(set.to_string());
        let summary = save_patterns(&out, set, &layout, quiet(&interrupt)).unwrap();
        assert_eq!(summary.count, 16);
        assert_eq!(summary.set, set);

        let list = list_frames(&out).unwrap();
        assert_eq!(list.len(), 16);
        assert_eq!(list.indices, Some((0..16).collect::<Vec<u64>>()));
        for (j, path) in list.paths.iter().enumerate() {
            assert!(path.ends_with(pattern_file_name(j)));
            let frame = load_gray(path).unwrap();
            assert_eq!(frame.data, layout.pattern_image(set, j).data, "{set} pattern {j}");
        }
    }
}

#[test]
fn test_file_names_are_zero_padded() {
    assert_eq!(pattern_file_name(0), "hadamard_0000.png");
    assert_eq!(pattern_file_name(4095), "hadamard_4095.png");
}

#[test]
fn test_pattern_cells_follow_sylvester_columns() {
    let layout = PatternLayout::new(4, FrameShape::new(8, 12)).unwrap();
    // Offsets: (8 - 8) / 2 = 0 rows, (12 - 8) / 2 = 2 cols.
    for j in 0..layout.order() {
        let frame = layout.pattern_image(PatternSet::H1, j);
        for k in 0..layout.order() {
            let (r, c) = ((k / 4) * 2, (k % 4) * 2 + 2);
            let expected = if sylvester_entry(k, j) > 0 { 255 } else { 0 };
            for (dr, dc) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                assert_eq!(frame.data[[r + dr, c + dc]], expected, "cell {k} of pattern {j}");
            }
        }
        for r in 0..8 {
            for c in [0, 1, 10, 11] {
                assert_eq!(frame.data[[r, c]], 0);
            }
        }
    }
}

#[test]
fn test_bipolar_matches_h1() {
    let layout = PatternLayout::new(2, FrameShape::new(4, 6)).unwrap();
    for j in 0..layout.order() {
        for pixel in 0..layout.frame.pixels() {
            let expected = if layout.is_lit(PatternSet::H1, j, pixel) { 1 } else { -1 };
            assert_eq!(layout.bipolar(j, pixel), expected);
        }
    }
}

#[test]
fn test_interrupted_generation() {
    let dir = tempfile::tempdir().unwrap();
    let layout = PatternLayout::new(2, FrameShape::new(4, 4)).unwrap();
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let err = save_patterns(dir.path(), PatternSet::H1, &layout, quiet(&interrupt))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        MmfError::Interrupted {
            stage: "pattern generation"
        }
    ));
    assert!(!dir.path().join(pattern_file_name(0)).exists());
}
