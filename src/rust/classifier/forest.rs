//! Multi-output random forest: one smartcore forest per target column.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::RandomForestClassifier;
use smartcore::linalg::basic::matrix::DenseMatrix;

use super::error::ClassifierError;
use super::{ClassifierInfo, MultiOutputClassifier};

/// The forest fitted for a single output column.
pub(crate) type OutputForest = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Copies a feature view into the row-major matrix smartcore expects.
pub(crate) fn to_dense(x: &ArrayView2<f64>) -> DenseMatrix<f64> {
    DenseMatrix::new(x.nrows(), x.ncols(), x.iter().copied().collect(), false)
}

/// A trained random forest. Immutable once built.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "ForestParts")]
pub struct RandomForest {
    outputs: Vec<OutputForest>,
    n_trees: usize,
    n_features: usize,
    n_classes: Vec<usize>,
}

#[derive(Deserialize)]
struct ForestParts {
    outputs: Vec<OutputForest>,
    n_trees: usize,
    n_features: usize,
    n_classes: Vec<usize>,
}

impl TryFrom<ForestParts> for RandomForest {
    type Error = ClassifierError;

    fn try_from(parts: ForestParts) -> Result<Self, Self::Error> {
        RandomForest::from_outputs(parts.outputs, parts.n_trees, parts.n_features, parts.n_classes)
    }
}

impl RandomForest {
    /// Assembles a forest, checking that the shape metadata is consistent.
    pub(crate) fn from_outputs(
        outputs: Vec<OutputForest>,
        n_trees: usize,
        n_features: usize,
        n_classes: Vec<usize>,
    ) -> Result<Self, ClassifierError> {
        if outputs.is_empty() {
            return Err(ClassifierError::ValidationError("empty forest".into()));
        }
        if outputs.len() != n_classes.len() {
            return Err(ClassifierError::ValidationError(format!(
                "{} fitted outputs but {} class counts",
                outputs.len(),
                n_classes.len()
            )));
        }
        if n_trees == 0 || n_features == 0 {
            return Err(ClassifierError::ValidationError(
                "forest must have at least one tree and one feature".into(),
            ));
        }
        if n_classes.contains(&0) {
            return Err(ClassifierError::ValidationError("output with no classes".into()));
        }
        Ok(Self {
            outputs,
            n_trees,
            n_features,
            n_classes,
        })
    }

    /// Trees per output.
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    pub fn n_classes(&self) -> &[usize] {
        &self.n_classes
    }

    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            n_trees: self.n_trees,
            n_features: self.n_features,
            n_classes: self.n_classes.clone(),
        }
    }
}

impl MultiOutputClassifier for RandomForest {
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<usize>, ClassifierError> {
        if x.ncols() != self.n_features {
            return Err(ClassifierError::PredictionError(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let mut out = Array2::zeros((x.nrows(), self.n_outputs()));
        if x.nrows() == 0 {
            return Ok(out);
        }

        let dense = to_dense(&x);
        for (output, forest) in self.outputs.iter().enumerate() {
            let predicted = forest
                .predict(&dense)
                .map_err(|e| ClassifierError::PredictionError(format!("output {}: {}", output, e)))?;
            for (i, class) in predicted.into_iter().enumerate() {
                out[[i, output]] = class as usize;
            }
        }
        Ok(out)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_outputs(&self) -> usize {
        self.n_classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{MultiOutputTrainer, RandomForestBuilder};
    use ndarray::array;

    fn small_forest() -> RandomForest {
        let x = array![[0.0, 1.0], [0.2, 1.0], [0.9, 0.0], [1.0, 0.0], [0.1, 1.0], [0.8, 0.0]];
        let y = array![[0, 1], [0, 1], [1, 0], [1, 0], [0, 1], [1, 0]];
        RandomForestBuilder::new()
            .n_trees(5)
            .build()
            .unwrap()
            .fit(x.view(), y.view())
            .unwrap()
    }

    #[test]
    fn test_predict_checks_width() {
        let rf = small_forest();
        let err = rf.predict(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(err, ClassifierError::PredictionError(_)));
    }

    #[test]
    fn test_empty_batch() {
        let rf = small_forest();
        let x = Array2::<f64>::zeros((0, 2));
        assert_eq!(rf.predict(x.view()).unwrap().dim(), (0, 2));
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let rf = small_forest();
        let json = serde_json::to_string(&rf).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        let x = array![[0.0, 1.0], [1.0, 0.0], [0.5, 0.5]];
        assert_eq!(restored.predict(x.view()).unwrap(), rf.predict(x.view()).unwrap());
        assert_eq!(restored.info(), rf.info());
    }

    #[test]
    fn test_inconsistent_metadata_rejected() {
        let rf = small_forest();
        let mut value = serde_json::to_value(&rf).unwrap();
        value["n_classes"] = serde_json::json!([2]);
        assert!(serde_json::from_value::<RandomForest>(value.clone()).is_err());
        value["n_classes"] = serde_json::json!([2, 0]);
        assert!(serde_json::from_value::<RandomForest>(value).is_err());
    }
}
