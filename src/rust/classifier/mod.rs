//! The multi-output classifier seam and its random forest implementation.
//!
//! Labeling and encoding only talk to [`MultiOutputClassifier`] and
//! [`MultiOutputTrainer`], so another algorithm can be dropped in without
//! touching them.

use ndarray::{Array2, ArrayView2};

mod error;
mod forest;
pub mod builder;

pub use builder::{RandomForestBuilder, RandomForestTrainer};
pub use error::ClassifierError;
pub use forest::RandomForest;

/// A fitted model mapping feature rows to one class code per output.
pub trait MultiOutputClassifier {
    /// Predicts an `n x n_outputs` matrix of class codes.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<usize>, ClassifierError>;

    fn n_features(&self) -> usize;

    fn n_outputs(&self) -> usize;
}

/// Something that can fit a [`MultiOutputClassifier`] from `(X, Y)`.
pub trait MultiOutputTrainer {
    type Model: MultiOutputClassifier;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView2<usize>) -> Result<Self::Model, ClassifierError>;
}

/// Summary of a trained forest
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Number of trees fitted for each output
    pub n_trees: usize,
    /// Width of the feature vectors the forest expects
    pub n_features: usize,
    /// Number of classes seen per output
    pub n_classes: Vec<usize>,
}
