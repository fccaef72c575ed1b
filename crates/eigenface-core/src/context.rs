//! Recognition context: the active (eigenspace, gallery) pair.
//!
//! A retrain builds a complete [`TrainedModel`] off to the side and
//! publishes it with a single pointer swap, so readers holding the previous
//! model never see a half-updated pair.

use crate::eigenspace::{Eigenspace, EigenspaceTrainer, TrainerError};
use crate::progress::{Progress, ProgressSink};
use crate::projection::{project, ProjectionError};
use crate::store::{DistanceMetric, Euclidean, FeatureStore, KnnTally};
use crate::types::{FaceSample, GrayRaster, RecognizerConfig};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use thiserror::Error;

/// Ranking entries included in a [`Classification`].
const RANKING_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("training failed: {0}")]
    Training(#[from] TrainerError),
    #[error("projection failed: {0}")]
    Projection(#[from] ProjectionError),
    #[error("no trained model, train a gallery first")]
    NotTrained,
    #[error("training thread panicked")]
    WorkerPanicked,
}

/// Result of classifying one probe face.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    /// Probe coefficients in the model's eigenspace.
    pub coefficients: Vec<f64>,
    /// Label of the single closest gallery entry.
    pub nearest: Option<String>,
    /// Majority vote among the configured number of neighbours.
    pub majority: Option<String>,
    pub tally: Option<KnnTally>,
    /// Closest `(label, distance)` pairs, ascending.
    pub ranking: Vec<(String, f64)>,
}

/// An eigenspace together with the gallery projected into it.
#[derive(Debug)]
pub struct TrainedModel {
    eigenspace: Eigenspace,
    store: FeatureStore,
    components: usize,
    neighbours: usize,
}

impl TrainedModel {
    /// Train an eigenspace on `samples` and project every sample into it.
    pub fn build(
        samples: Vec<FaceSample>,
        config: &RecognizerConfig,
        progress: &dyn ProgressSink,
    ) -> Result<Self, TrainerError> {
        let eigenspace = EigenspaceTrainer::new().train_samples(&samples, progress)?;

        let mut store = FeatureStore::new();
        for sample in samples {
            let coefficients = project(&sample.raster, &eigenspace, config.components)
                .map_err(|e| TrainerError::Numerical(format!("projecting training sample: {e}")))?;
            store.insert(Arc::new(sample), coefficients);
        }

        tracing::info!(
            samples = store.len(),
            labels = store.labels().len(),
            components = config.components.min(eigenspace.rank()),
            "gallery projected"
        );

        Ok(Self {
            eigenspace,
            store,
            components: config.components,
            neighbours: config.neighbours,
        })
    }

    pub fn eigenspace(&self) -> &Eigenspace {
        &self.eigenspace
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Coefficients per feature vector: the configured count clamped to the rank.
    pub fn components(&self) -> usize {
        self.components.min(self.eigenspace.rank())
    }

    /// Coefficients of `face` in this model's eigenspace.
    pub fn project(&self, face: &GrayRaster) -> Result<Vec<f64>, ProjectionError> {
        project(face, &self.eigenspace, self.components)
    }

    /// Classify `face` with the default Euclidean metric.
    pub fn classify(&self, face: &GrayRaster) -> Result<Classification, ProjectionError> {
        self.classify_with(face, &Euclidean)
    }

    pub fn classify_with(
        &self,
        face: &GrayRaster,
        metric: &dyn DistanceMetric,
    ) -> Result<Classification, ProjectionError> {
        let coefficients = self.project(face)?;

        let ranked = self.store.distance_order(&coefficients, metric);
        let nearest = ranked.first().map(|m| m.label.to_string());
        let tally = KnnTally::from_ranking(&ranked, self.neighbours);
        let majority = tally.as_ref().map(|t| t.majority.clone());
        let ranking = ranked
            .iter()
            .take(RANKING_LIMIT)
            .map(|m| (m.label.to_string(), m.distance))
            .collect::<Vec<_>>();

        tracing::debug!(
            nearest = nearest.as_deref().unwrap_or("-"),
            majority = majority.as_deref().unwrap_or("-"),
            best_distance = ranking.first().map(|(_, d)| *d).unwrap_or(f64::NAN),
            "classified probe"
        );

        Ok(Classification {
            coefficients,
            nearest,
            majority,
            tally,
            ranking,
        })
    }
}

/// Shared slot holding the currently published model.
///
/// Cloning the context shares the slot.
#[derive(Debug, Clone)]
pub struct RecognitionContext {
    config: RecognizerConfig,
    current: Arc<RwLock<Option<Arc<TrainedModel>>>>,
}

impl RecognitionContext {
    pub fn new(config: RecognizerConfig) -> Self {
        Self {
            config,
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// The published model, if any.
    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }

    /// Replace the published model.
    pub fn publish(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let model = Arc::new(model);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::clone(&model));
        model
    }

    /// Retrain on `samples` synchronously and publish the result.
    ///
    /// On failure the previously published model stays active.
    pub fn train(
        &self,
        samples: Vec<FaceSample>,
        progress: &dyn ProgressSink,
    ) -> Result<Arc<TrainedModel>, ContextError> {
        let model = TrainedModel::build(samples, &self.config, progress)?;
        Ok(self.publish(model))
    }

    /// Retrain on a dedicated OS thread, streaming progress over a channel.
    pub fn spawn_training(
        &self,
        samples: Vec<FaceSample>,
    ) -> (JoinHandle<Result<Arc<TrainedModel>, ContextError>>, Receiver<Progress>) {
        let (tx, rx) = mpsc::channel();
        let context = self.clone();

        let handle = std::thread::Builder::new()
            .name("eigenface-train".into())
            .spawn(move || {
                tracing::info!(samples = samples.len(), "training thread started");
                let result = context.train(samples, &tx);
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "training failed; keeping previous model");
                }
                result
            })
            .expect("failed to spawn training thread");

        (handle, rx)
    }

    /// Join a handle from [`spawn_training`](Self::spawn_training).
    pub fn wait(
        handle: JoinHandle<Result<Arc<TrainedModel>, ContextError>>,
    ) -> Result<Arc<TrainedModel>, ContextError> {
        handle.join().map_err(|_| ContextError::WorkerPanicked)?
    }

    /// Classify against the published model.
    pub fn classify(&self, face: &GrayRaster) -> Result<Classification, ContextError> {
        let model = self.current().ok_or(ContextError::NotTrained)?;
        Ok(model.classify(face)?)
    }
}
