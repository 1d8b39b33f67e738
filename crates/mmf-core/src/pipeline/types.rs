use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MmfError, Result};

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    GeneratingPatterns,
    Vectorizing,
    BuildingPatternMatrix,
    VerifyingPatterns,
    Transforming,
    Concatenating,
    EstimatingTransmission,
    Correlating,
    Reconstructing,
    Writing,
}

impl PipelineStage {
    /// Short stage name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GeneratingPatterns => "pattern generation",
            Self::Vectorizing => "vectorization",
            Self::BuildingPatternMatrix => "pattern matrix",
            Self::VerifyingPatterns => "pattern verification",
            Self::Transforming => "baseline transform",
            Self::Concatenating => "concatenation",
            Self::EstimatingTransmission => "transmission estimate",
            Self::Correlating => "correlation",
            Self::Reconstructing => "reconstruction",
            Self::Writing => "output",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeneratingPatterns => write!(f, "Generating patterns"),
            Self::Vectorizing => write!(f, "Vectorizing images"),
            Self::BuildingPatternMatrix => write!(f, "Building [H, -H]"),
            Self::VerifyingPatterns => write!(f, "Verifying H2 = -H1"),
            Self::Transforming => write!(f, "Baseline subtraction"),
            Self::Concatenating => write!(f, "Concatenating"),
            Self::EstimatingTransmission => write!(f, "Estimating RVITM"),
            Self::Correlating => write!(f, "Correlating"),
            Self::Reconstructing => write!(f, "Reconstructing"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., chunk count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` work items within the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative abort flag polled between chunks.
///
/// Setting it makes the running stage return [`MmfError::Interrupted`]
/// before the next chunk; the stage's output stays in its `.partial` file.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Err(Interrupted) once triggered.
    pub fn check(&self, stage: PipelineStage) -> Result<()> {
        if self.is_triggered() {
            Err(MmfError::Interrupted {
                stage: stage.name(),
            })
        } else {
            Ok(())
        }
    }
}

/// Progress sink plus abort flag, passed to every chunked operation.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub reporter: &'a dyn ProgressReporter,
    pub interrupt: &'a Interrupt,
}

impl<'a> StageContext<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter, interrupt: &'a Interrupt) -> Self {
        Self {
            reporter,
            interrupt,
        }
    }
}
