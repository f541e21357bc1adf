//! Linear model adapter: fitting, prediction, and persistence.

/// Model persistence.
pub mod artifact;
/// Symmetric PSD solves shared by Ridge and VIF.
pub mod linalg;
/// Ridge estimator and the fitted model.
pub mod ridge;

pub use artifact::ModelArtifact;
pub use ridge::{FittedModel, RidgeRegression, DEFAULT_ALPHA};
