//! Advisory progress notifications for long-running training.

use serde::Serialize;
use std::fmt;
use std::sync::mpsc::Sender;

/// Named stages of an eigenspace training run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    ConstructingMatrix,
    ComputingAverages,
    ComputingCovariance,
    CalculatingEigenvectors,
    SortingEigenvectors,
    ExtractingEigenvalues,
    NormalizingEigenvectors,
}

impl TrainingStage {
    pub const ALL: [TrainingStage; 7] = [
        TrainingStage::ConstructingMatrix,
        TrainingStage::ComputingAverages,
        TrainingStage::ComputingCovariance,
        TrainingStage::CalculatingEigenvectors,
        TrainingStage::SortingEigenvectors,
        TrainingStage::ExtractingEigenvalues,
        TrainingStage::NormalizingEigenvectors,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            TrainingStage::ConstructingMatrix => "constructing matrix",
            TrainingStage::ComputingAverages => "computing averages",
            TrainingStage::ComputingCovariance => "computing covariance matrix",
            TrainingStage::CalculatingEigenvectors => "calculating eigenvectors",
            TrainingStage::SortingEigenvectors => "sorting eigenvectors",
            TrainingStage::ExtractingEigenvalues => "extracting eigenvalues",
            TrainingStage::NormalizingEigenvectors => "normalizing eigenvectors",
        }
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    Stage(TrainingStage),
    Finished,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Stage(stage) => write!(f, "{stage}..."),
            Progress::Finished => f.write_str("finished"),
        }
    }
}

/// Receiver of progress notifications.
///
/// Delivery is best-effort: a sink that can no longer deliver drops events.
pub trait ProgressSink {
    fn report(&self, event: Progress);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: Progress) {}
}

impl ProgressSink for Sender<Progress> {
    fn report(&self, event: Progress) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn report(&self, event: Progress) {
        (**self).report(event);
    }
}
