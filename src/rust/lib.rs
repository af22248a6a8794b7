//! Olive tree health labeling and prediction from daily weather readings.
//!
//! The pipeline has two halves. Offline, raw weather exports are normalized,
//! labeled by a fixed set of agronomic threshold rules, and used to train a
//! multi-output random forest. Online, a [`Predictor`] loads the trained
//! artifacts once and answers single readings with a status, an action and a
//! short explanation.
//!
//! # Labeling
//!
//! ```rust
//! use olivewatch::{label_record, RecommendedAction, TreeStatus, WeatherRecord};
//!
//! let mut day = WeatherRecord::empty("2024-07-15", "Tozeur");
//! day.temperature_c = 38.0;
//! day.temperature_max_c = 42.0;
//! day.temperature_min_c = 34.0;
//! day.humidite_pct = 30.0;
//! day.pluie_mm = 0.0;
//! day.pluie_3j = 0.0;
//!
//! let labels = label_record(&day);
//! assert_eq!(labels.status, TreeStatus::HeatStress);
//! assert_eq!(labels.action, RecommendedAction::ShadeCooling);
//! ```
//!
//! # Training and inference
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use olivewatch::{label_records, train, Predictor, TrainingConfig, WeatherRecord};
//! use serde_json::json;
//!
//! let mut records = Vec::new();
//! for temp in [2.0, 15.0, 25.0, 39.0] {
//!     for humidity in [25.0, 55.0, 90.0] {
//!         let mut r = WeatherRecord::empty("2024-05-01", "Sfax");
//!         r.temperature_c = temp;
//!         r.temperature_max_c = temp + 4.0;
//!         r.temperature_min_c = temp - 4.0;
//!         r.humidite_pct = humidity;
//!         r.pluie_mm = 0.0;
//!         r.pluie_3j = 0.0;
//!         r.vitesse_vent_max_kmh = 10.0;
//!         r.code_meteo_dominant = Some(3);
//!         records.push(r);
//!     }
//! }
//! let labels = label_records(&records);
//!
//! let mut config = TrainingConfig::default();
//! config.forest.n_trees = 10;
//! let outcome = train(&records, &labels, &config)?;
//!
//! let predictor = Predictor::from_bundle(outcome.bundle)?;
//! let response = predictor.respond(&json!({"temp_c": 39, "humidite_pct": 55}));
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod labeler;
pub mod model_manager;
pub mod predictor;
pub mod training;
pub mod weather;

pub use classifier::{
    ClassifierError, ClassifierInfo, MultiOutputClassifier, MultiOutputTrainer, RandomForest, RandomForestBuilder,
    RandomForestTrainer,
};
pub use config::{ForestConfig, MaxFeatures, TrainingConfig};
pub use dataset::{
    read_labeled_csv, read_weather_csv, write_labeled_csv, write_predictions_csv, DatasetError, WeatherTable,
};
pub use encoder::{EncoderError, FeatureRow, FeatureSchema, LabelEncoder, TargetEncoders};
pub use labeler::{label_counts, label_record, label_records, LabelCounts, LabelPair, RecommendedAction, TreeStatus};
pub use model_manager::{ModelBundle, ModelError, ModelManager};
pub use predictor::{generate_conclusion, PredictError, PredictionResponse, Predictor, ReadingError, SensorReading};
pub use training::{train, TrainingError, TrainingOutcome, TrainingReport};
pub use weather::{normalize, parse_decimal, parse_weather_code, rolling_rain_3d, WeatherRecord};

/// Initializes `env_logger`, honouring `RUST_LOG` and falling back to `default_filter`.
pub fn init_logger(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).try_init();
}
