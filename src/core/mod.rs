//! Core surface-water processing stages

pub mod engine;
pub mod stack_filter;
pub mod cloud_score;
pub mod harmonize;
pub mod defringe;
pub mod composite;
pub mod indices;
pub mod combine;
pub mod classify;
pub mod monthly;

// Re-export main types
pub use engine::{Kernel, LocalEngine, RasterEngine, percentile_of};
pub use stack_filter::{StackFilter, check_crs};
pub use cloud_score::{CloudSuppressor, simple_cloud_score};
pub use harmonize::{BandHarmonizer, SensorBandMap};
pub use defringe::{FringeRemover, fringe_kernel};
pub use composite::PercentileCompositor;
pub use indices::{IndexEngine, SpectralIndex, normalized_difference};
pub use combine::{clean_water, elevation_mask};
pub use classify::{
    ClassificationOutput, ClassificationParameters, ClassificationResult, ClassificationSummary,
    WaterClassifier,
};
pub use monthly::{MonthlySeries, TemporalDecomposer, month_subset};
