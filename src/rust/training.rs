//! Fit a [`ModelBundle`] from labeled records and report held-out accuracy.

use log::info;
use ndarray::{ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::classifier::{ClassifierError, MultiOutputClassifier, MultiOutputTrainer, RandomForestBuilder};
use crate::config::TrainingConfig;
use crate::encoder::{encode_training_matrix, EncoderError, FeatureSchema, TargetEncoders};
use crate::labeler::LabelPair;
use crate::model_manager::ModelBundle;
use crate::weather::WeatherRecord;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("{records} records but {labels} labels")]
    LengthMismatch { records: usize, labels: usize },
    #[error("test_size must be in [0, 1), got {0}")]
    InvalidTestSize(f64),
    #[error("Not enough rows to train: {0}")]
    TooFewRows(usize),
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Held-out accuracy per target. Accuracies are `None` when nothing was held out.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    pub status_accuracy: Option<f64>,
    pub action_accuracy: Option<f64>,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub report: TrainingReport,
}

fn accuracy(predicted: ArrayView1<usize>, truth: ArrayView1<usize>) -> f64 {
    let hits = predicted.iter().zip(truth.iter()).filter(|(p, t)| p == t).count();
    hits as f64 / truth.len() as f64
}

/// Shuffled train/test row indices; the test share is rounded up.
fn split_indices(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = (n as f64 * test_size).ceil() as usize;
    let train = indices.split_off(n_test);
    (train, indices)
}

/// Encodes `records`, fits a forest on a seeded training split and scores the rest.
pub fn train(records: &[WeatherRecord], labels: &[LabelPair], config: &TrainingConfig) -> Result<TrainingOutcome, TrainingError> {
    if records.len() != labels.len() {
        return Err(TrainingError::LengthMismatch {
            records: records.len(),
            labels: labels.len(),
        });
    }
    if !(0.0..1.0).contains(&config.test_size) {
        return Err(TrainingError::InvalidTestSize(config.test_size));
    }

    let schema = FeatureSchema::from_records(records);
    let x = encode_training_matrix(records, &schema)?;
    let encoders = TargetEncoders::fit(labels);
    let y = encoders.encode_labels(labels)?;
    info!("Encoded {} rows on {} features", x.nrows(), schema.len());

    let (train_idx, test_idx) = split_indices(records.len(), config.test_size, config.split_seed);
    if train_idx.is_empty() {
        return Err(TrainingError::TooFewRows(records.len()));
    }
    let x_train = x.select(Axis(0), &train_idx);
    let y_train = y.select(Axis(0), &train_idx);

    let trainer = RandomForestBuilder::new().with_config(config.forest.clone()).build()?;
    let classifier = trainer.fit(x_train.view(), y_train.view())?;

    let (status_accuracy, action_accuracy) = if test_idx.is_empty() {
        (None, None)
    } else {
        let x_test = x.select(Axis(0), &test_idx);
        let y_test = y.select(Axis(0), &test_idx);
        let predicted = classifier.predict(x_test.view())?;
        (
            Some(accuracy(predicted.column(0), y_test.column(0))),
            Some(accuracy(predicted.column(1), y_test.column(1))),
        )
    };
    if let (Some(status), Some(action)) = (status_accuracy, action_accuracy) {
        info!("Held-out accuracy: status {:.4}, action {:.4}", status, action);
    }

    Ok(TrainingOutcome {
        bundle: ModelBundle {
            classifier,
            encoders,
            schema,
        },
        report: TrainingReport {
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            status_accuracy,
            action_accuracy,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;
    use crate::labeler::label_records;

    fn grid() -> Vec<WeatherRecord> {
        let mut records = Vec::new();
        for (i, temp) in [2.0, 12.0, 22.0, 30.0, 38.0].into_iter().enumerate() {
            for humidity in [20.0, 50.0, 90.0] {
                for rain in [0.0, 15.0] {
                    for _ in 0..4 {
                        let mut r = WeatherRecord::empty(format!("2024-01-{:02}", i + 1), "Sfax");
                        r.temperature_c = temp;
                        r.temperature_max_c = temp + 4.0;
                        r.temperature_min_c = temp - 4.0;
                        r.humidite_pct = humidity;
                        r.pluie_mm = rain;
                        r.pluie_3j = rain;
                        r.vitesse_vent_max_kmh = 10.0;
                        r.code_meteo_dominant = Some(if rain > 0.0 { 61 } else { 0 });
                        records.push(r);
                    }
                }
            }
        }
        records
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            forest: ForestConfig {
                n_trees: 15,
                ..ForestConfig::default()
            },
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = split_indices(10, 0.2, 42);
        assert_eq!((train.len(), test.len()), (8, 2));
        let (train, test) = split_indices(11, 0.2, 42);
        assert_eq!((train.len(), test.len()), (8, 3));
        let (train, test) = split_indices(5, 0.0, 42);
        assert_eq!((train.len(), test.len()), (5, 0));
    }

    #[test]
    fn test_train_reports_accuracy() {
        let records = grid();
        let labels = label_records(&records);
        let outcome = train(&records, &labels, &small_config()).unwrap();
        assert_eq!(outcome.report.n_train + outcome.report.n_test, records.len());
        assert_eq!(outcome.report.n_test, 24);
        assert!(outcome.report.status_accuracy.unwrap() > 0.7);
        assert!(outcome.bundle.validate().is_ok());
        assert_eq!(
            outcome.bundle.schema.names().last().map(String::as_str),
            Some("meteo_code_61")
        );
    }

    #[test]
    fn test_no_holdout() {
        let records = grid();
        let labels = label_records(&records);
        let config = TrainingConfig {
            test_size: 0.0,
            ..small_config()
        };
        let outcome = train(&records, &labels, &config).unwrap();
        assert_eq!(outcome.report.status_accuracy, None);
        assert_eq!(outcome.report.n_train, records.len());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let records = grid();
        let labels = label_records(&records);
        assert!(matches!(
            train(&records, &labels[1..], &small_config()),
            Err(TrainingError::LengthMismatch { .. })
        ));
        let config = TrainingConfig {
            test_size: 1.0,
            ..small_config()
        };
        assert!(matches!(train(&records, &labels, &config), Err(TrainingError::InvalidTestSize(_))));
        assert!(matches!(
            train(&[], &[], &small_config()),
            Err(TrainingError::Encoder(EncoderError::EmptyDataset))
        ));
    }
}
