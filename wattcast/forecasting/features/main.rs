//! Feature builder: raw CSV readings to a pruned, model-ready dataset.

/// Hour encodings, lag features, and row accounting.
pub mod builder;
/// CSV ingestion.
pub mod raw;
/// Variance inflation factors and iterative pruning.
pub mod vif;

pub use builder::{FeatureBuild, FeatureBuildConfig, FeatureBuilder, HOUR_FEATURES, LAG_SUFFIX};
pub use raw::{CsvLayout, RawFrame, RawObservation};
pub use vif::{VifOutcome, VifPruner, VifRemoval, VifScore, DEFAULT_VIF_THRESHOLD};
