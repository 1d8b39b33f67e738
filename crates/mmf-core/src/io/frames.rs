use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{raise, MmfError, Result, Warning};

/// Ordered image files of one acquisition set.
#[derive(Clone, Debug)]
pub struct FrameList {
    pub dir: PathBuf,
    pub paths: Vec<PathBuf>,
    /// Filename-derived acquisition indices, when every file carries one.
    pub indices: Option<Vec<u64>>,
    pub warnings: Vec<Warning>,
}

impl FrameList {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// List the PNG files of `dir` in acquisition order.
///
/// Files are ordered by the decimal index at the end of their stem
/// (`frame_12.png` → 12), so `frame_100` sorts after `frame_99` even without
/// zero padding. Duplicate indices and gaps are fatal. When some file has no
/// index the listing falls back to lexicographic order with a warning.
pub fn list_frames(dir: &Path) -> Result<FrameList> {
    if !dir.is_dir() {
        return Err(MmfError::MissingFile(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
        })
        .collect();

    if paths.is_empty() {
        return Err(MmfError::EmptySequence);
    }
    paths.sort();

    let mut warnings = Vec::new();
    let indexed: Option<Vec<(u64, PathBuf)>> = paths
        .iter()
        .map(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(trailing_index)
                .map(|i| (i, p.clone()))
        })
        .collect();

    let Some(mut indexed) = indexed else {
        raise(
            &mut warnings,
            Warning::UnindexedFilenames {
                dir: dir.to_path_buf(),
            },
        );
        return Ok(FrameList {
            dir: dir.to_path_buf(),
            paths,
            indices: None,
            warnings,
        });
    };

    indexed.sort_by_key(|(i, _)| *i);
    for pair in indexed.windows(2) {
        let (prev, next) = (pair[0].0, pair[1].0);
        if next == prev {
            return Err(MmfError::FrameOrdering {
                dir: dir.to_path_buf(),
                reason: format!(
                    "index {prev} used by both {} and {}",
                    pair[0].1.display(),
                    pair[1].1.display()
                ),
            });
        }
        if next != prev + 1 {
            return Err(MmfError::FrameOrdering {
                dir: dir.to_path_buf(),
                reason: format!("indices jump from {prev} to {next}"),
            });
        }
    }

    debug!(
        dir = %dir.display(),
        count = indexed.len(),
        first = indexed[0].0,
        "Listed frames"
    );

    let (indices, paths): (Vec<u64>, Vec<PathBuf>) = indexed.into_iter().unzip();
    Ok(FrameList {
        dir: dir.to_path_buf(),
        paths,
        indices: Some(indices),
        warnings,
    })
}

/// Require two acquisition sets to pair up index-for-index.
pub fn check_pairing(what: &'static str, left: &FrameList, right: &FrameList) -> Result<()> {
    if left.len() != right.len() {
        return Err(MmfError::CountMismatch {
            what,
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

/// Decimal digits at the end of a file stem.
fn trailing_index(stem: &str) -> Option<u64> {
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    stem[stem.len() - digits..].parse().ok()
}
