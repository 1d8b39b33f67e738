use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::DEFAULT_PROGRESS_EVERY;
use crate::error::Result;
use crate::io::image_io::save_frame;
use crate::pipeline::types::{PipelineStage, StageContext};

use super::layout::{PatternLayout, PatternSet};

#[derive(Clone, Debug)]
pub struct PatternSaveSummary {
    pub dir: PathBuf,
    pub set: PatternSet,
    pub count: usize,
}

/// File name of pattern `index`.
pub fn pattern_file_name(index: usize) -> String {
    format!("hadamard_{index:04}.png")
}

/// Render every pattern of `set` to `dir` as `hadamard_NNNN.png`.
pub fn save_patterns(
    dir: &Path,
    set: PatternSet,
    layout: &PatternLayout,
    ctx: StageContext<'_>,
) -> Result<PatternSaveSummary> {
    fs::create_dir_all(dir)?;
    let count = layout.order();
    info!(
        dir = %dir.display(),
        %set,
        count,
        size = layout.size,
        scale = layout.scale,
        "Generating Hadamard patterns"
    );

    ctx.reporter
        .begin_stage(PipelineStage::GeneratingPatterns, Some(count));
    for j in 0..count {
        ctx.interrupt.check(PipelineStage::GeneratingPatterns)?;
        let frame = layout.pattern_image(set, j);
        save_frame(&frame, &dir.join(pattern_file_name(j)))?;
        if j % DEFAULT_PROGRESS_EVERY == 0 || j + 1 == count {
            debug!(saved = j + 1, count, "Saved pattern");
        }
        ctx.reporter.advance(j + 1);
    }
    ctx.reporter.finish_stage();

    Ok(PatternSaveSummary {
        dir: dir.to_path_buf(),
        set,
        count,
    })
}
