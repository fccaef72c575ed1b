//! eigenface-core: classical eigenface recognition engine.
//!
//! Locates the face in a colour photo by skin-colour segmentation, reduces
//! fixed-size face rasters to PCA coefficients, and classifies probes by
//! nearest-neighbour search over a labelled gallery.

pub mod context;
pub mod eigenspace;
pub mod locator;
pub mod progress;
pub mod projection;
pub mod store;
pub mod types;

pub use context::{Classification, ContextError, RecognitionContext, TrainedModel};
pub use eigenspace::{Eigenspace, EigenspaceTrainer, TrainerError};
pub use locator::{is_skin, median_filter, FaceLocator, FaceRegion, FitPolicy};
pub use progress::{NoProgress, Progress, ProgressSink, TrainingStage};
pub use projection::{project, reconstruct, reconstruction_error, ProjectionError};
pub use store::{
    euclidean_distance, ChartPoint, DistanceMetric, Euclidean, FeatureStore, FeatureVector,
    KnnTally, LabelDictionary, LabelId, Manhattan, RankedMatch,
};
pub use types::{ColorRaster, FaceSample, GrayRaster, RasterError, RasterImage, RecognizerConfig};
