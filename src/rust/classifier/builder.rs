use log::{debug, info};
use ndarray::{ArrayView2, Axis};
use smartcore::ensemble::random_forest_classifier::RandomForestClassifierParameters;

use super::error::ClassifierError;
use super::forest::{to_dense, OutputForest, RandomForest};
use super::MultiOutputTrainer;
use crate::config::{ForestConfig, MaxFeatures};

/// A builder for configuring a random forest trainer with a fluent interface.
#[derive(Default, Debug, Clone)]
pub struct RandomForestBuilder {
    config: ForestConfig,
}

impl RandomForestBuilder {
    /// Creates a builder holding the default [`ForestConfig`]
    ///
    /// # Example
    /// ```
    /// use olivewatch::RandomForestBuilder;
    ///
    /// let trainer = RandomForestBuilder::new().n_trees(10).seed(7).build().unwrap();
    /// assert_eq!(trainer.config().n_trees, 10);
    /// ```
    pub fn new() -> Self {
        Self {
            config: ForestConfig::default(),
        }
    }

    /// Replaces every setting with `config`
    pub fn with_config(mut self, config: ForestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.config.n_trees = n_trees;
        self
    }

    /// Maximum tree depth; `None` grows until leaves are pure
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    pub fn min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.config.min_samples_split = min_samples_split;
        self
    }

    pub fn max_features(mut self, max_features: MaxFeatures) -> Self {
        self.config.max_features = max_features;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Validates the configuration
    ///
    /// # Returns
    /// * `Result<RandomForestTrainer, ClassifierError>` - The trainer, or a
    ///   `BuildError` if:
    ///   - `n_trees` is zero
    ///   - `min_samples_split` is below 2
    ///   - `max_depth` is `Some(0)`
    ///   - `n_trees` or `max_depth` exceeds `u16::MAX`
    pub fn build(self) -> Result<RandomForestTrainer, ClassifierError> {
        if self.config.n_trees == 0 {
            return Err(ClassifierError::BuildError("n_trees must be at least 1".into()));
        }
        if u16::try_from(self.config.n_trees).is_err() {
            return Err(ClassifierError::BuildError(format!("n_trees must be at most {}", u16::MAX)));
        }
        if self.config.max_depth.is_some_and(|d| u16::try_from(d).is_err()) {
            return Err(ClassifierError::BuildError(format!("max_depth must be at most {}", u16::MAX)));
        }
        if self.config.min_samples_split < 2 {
            return Err(ClassifierError::BuildError("min_samples_split must be at least 2".into()));
        }
        if self.config.max_depth == Some(0) {
            return Err(ClassifierError::BuildError("max_depth must be positive".into()));
        }
        Ok(RandomForestTrainer { config: self.config })
    }
}

/// Fits [`RandomForest`]s with a validated configuration.
#[derive(Debug, Clone)]
pub struct RandomForestTrainer {
    config: ForestConfig,
}

impl RandomForestTrainer {
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    fn validate_inputs(x: &ArrayView2<f64>, y: &ArrayView2<usize>) -> Result<(), ClassifierError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ClassifierError::TrainingError("cannot fit on an empty feature matrix".into()));
        }
        if y.nrows() != x.nrows() {
            return Err(ClassifierError::ValidationError(format!(
                "feature matrix has {} rows but targets have {}",
                x.nrows(),
                y.nrows()
            )));
        }
        if y.ncols() == 0 {
            return Err(ClassifierError::ValidationError("no target columns".into()));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::ValidationError(
                "feature matrix contains non-finite values; impute before fitting".into(),
            ));
        }
        Ok(())
    }

    /// smartcore parameters for one output column.
    fn parameters(&self, n_features: usize, output: usize) -> RandomForestClassifierParameters {
        let mut params = RandomForestClassifierParameters::default()
            .with_n_trees(self.config.n_trees as u16)
            .with_min_samples_split(self.config.min_samples_split)
            .with_seed(self.config.seed.wrapping_add(output as u64));
        if let Some(depth) = self.config.max_depth {
            params = params.with_max_depth(depth as u16);
        }
        // smartcore's own default is floor(sqrt(n_features))
        if self.config.max_features != MaxFeatures::Sqrt {
            params = params.with_m(self.config.max_features.resolve(n_features));
        }
        params
    }
}

impl MultiOutputTrainer for RandomForestTrainer {
    type Model = RandomForest;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView2<usize>) -> Result<RandomForest, ClassifierError> {
        Self::validate_inputs(&x, &y)?;

        let n_classes: Vec<usize> = y
            .axis_iter(Axis(1))
            .map(|column| column.iter().copied().max().unwrap_or(0) + 1)
            .collect();
        info!(
            "Fitting {} trees per output on {} rows x {} features ({} candidates per split), classes per output: {:?}",
            self.config.n_trees,
            x.nrows(),
            x.ncols(),
            self.config.max_features.resolve(x.ncols()),
            n_classes
        );

        let dense = to_dense(&x);
        let mut outputs = Vec::with_capacity(y.ncols());
        for (output, column) in y.axis_iter(Axis(1)).enumerate() {
            let targets = column
                .iter()
                .map(|&code| {
                    u32::try_from(code)
                        .map_err(|_| ClassifierError::ValidationError(format!("class code {} is too large", code)))
                })
                .collect::<Result<Vec<u32>, _>>()?;
            let forest = OutputForest::fit(&dense, &targets, self.parameters(x.ncols(), output))
                .map_err(|e| ClassifierError::TrainingError(format!("output {}: {}", output, e)))?;
            debug!("Fitted output {} ({} classes)", output, n_classes[output]);
            outputs.push(forest);
        }

        RandomForest::from_outputs(outputs, self.config.n_trees, x.ncols(), n_classes)
    }
}
