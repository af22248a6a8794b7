//! Inference over a loaded [`ModelBundle`].
//!
//! A [`Predictor`] is built once, at startup, and then only read. Every
//! request goes through [`Predictor::respond`], which turns any per-request
//! problem (bad JSON, a non-numeric field, an out-of-range humidity) into a
//! structured failure instead of an error.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use olivewatch::{ModelManager, Predictor};
//!
//! let predictor = Predictor::load(&ModelManager::new_default()?)?;
//! let response = predictor.respond_str(r#"{"temp_c": 38, "humidite_pct": 30}"#);
//! println!("{}", response.to_pretty_json()?);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use chrono::Local;
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::classifier::{ClassifierError, MultiOutputClassifier, RandomForest};
use crate::encoder::{EncoderError, FeatureRow, FeatureSchema, TargetEncoders};
use crate::labeler::{LabelPair, RecommendedAction, TreeStatus};
use crate::model_manager::{ModelBundle, ModelError, ModelManager};
use crate::weather::WeatherRecord;

/// Spread applied around `temp_c` when max/min are not given.
pub const DEFAULT_TEMP_SPREAD_C: f64 = 3.0;
pub const DEFAULT_HUMIDITY_PCT: f64 = 60.0;
pub const DEFAULT_RAIN_MM: f64 = 0.0;
pub const DEFAULT_WIND_KMH: f64 = 10.0;
pub const DEFAULT_WEATHER_CODE: i64 = 3;

/// Location name given to single readings.
const READING_CITY: &str = "Olive Grove";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    #[error("input must be a JSON object")]
    NotAnObject,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {field} is not a number: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("field {field} is out of range ({value}): {reason}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid reading: {0}")]
    Reading(#[from] ReadingError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
}

/// One sensor reading with every optional field resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub temp_c: f64,
    pub temp_max_c: f64,
    pub temp_min_c: f64,
    pub humidite_pct: f64,
    pub pluie_mm: f64,
    pub vitesse_vent_max_kmh: f64,
    pub code_meteo_dominant: i64,
}

fn number_field(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ReadingError> {
    let Some(value) = obj.get(field).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ReadingError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

impl SensorReading {
    /// Reads a flat JSON object, applying the documented defaults.
    ///
    /// Numbers may be given as JSON numbers or numeric strings. `temp_c` is
    /// required; humidity is truncated to a whole percent and the weather
    /// code to an integer.
    pub fn from_json(input: &Value) -> Result<Self, ReadingError> {
        let obj = input.as_object().ok_or(ReadingError::NotAnObject)?;
        let temp_c = number_field(obj, "temp_c")?.ok_or(ReadingError::MissingField("temp_c"))?;

        let reading = Self {
            temp_c,
            temp_max_c: number_field(obj, "temp_max_c")?.unwrap_or(temp_c + DEFAULT_TEMP_SPREAD_C),
            temp_min_c: number_field(obj, "temp_min_c")?.unwrap_or(temp_c - DEFAULT_TEMP_SPREAD_C),
            humidite_pct: number_field(obj, "humidite_pct")?.unwrap_or(DEFAULT_HUMIDITY_PCT).trunc(),
            pluie_mm: number_field(obj, "pluie_mm")?.unwrap_or(DEFAULT_RAIN_MM),
            vitesse_vent_max_kmh: number_field(obj, "vitesse_vent_max_kmh")?.unwrap_or(DEFAULT_WIND_KMH),
            code_meteo_dominant: number_field(obj, "code_meteo_dominant")?
                .map_or(DEFAULT_WEATHER_CODE, |c| c.trunc() as i64),
        };
        reading.validate()?;
        Ok(reading)
    }

    fn validate(&self) -> Result<(), ReadingError> {
        if !(0.0..=100.0).contains(&self.humidite_pct) {
            return Err(ReadingError::OutOfRange {
                field: "humidite_pct",
                value: self.humidite_pct,
                reason: "humidity must be between 0 and 100",
            });
        }
        if self.pluie_mm < 0.0 {
            return Err(ReadingError::OutOfRange {
                field: "pluie_mm",
                value: self.pluie_mm,
                reason: "rainfall cannot be negative",
            });
        }
        if self.vitesse_vent_max_kmh < 0.0 {
            return Err(ReadingError::OutOfRange {
                field: "vitesse_vent_max_kmh",
                value: self.vitesse_vent_max_kmh,
                reason: "wind speed cannot be negative",
            });
        }
        Ok(())
    }

    /// The reading as a dated weather record for today.
    pub fn to_record(&self) -> WeatherRecord {
        let mut record = WeatherRecord::empty(Local::now().format("%Y-%m-%d").to_string(), READING_CITY);
        record.temperature_c = self.temp_c;
        record.temperature_max_c = self.temp_max_c;
        record.temperature_min_c = self.temp_min_c;
        record.humidite_pct = self.humidite_pct;
        record.pluie_mm = self.pluie_mm;
        record.vitesse_vent_max_kmh = self.vitesse_vent_max_kmh;
        record.code_meteo_dominant = Some(self.code_meteo_dominant);
        record
    }
}

/// Builds the human-readable explanation of a prediction.
///
/// The advice lines look at the resolved reading, so defaults count.
pub fn generate_conclusion(pair: &LabelPair, reading: &SensorReading) -> String {
    let mut lines = vec![format!("Olive tree status: {}", pair.status)];
    lines.push(
        match pair.status {
            TreeStatus::Healthy => "Your olive tree is in good condition.",
            TreeStatus::WaterStress => "Detected: water stress.",
            TreeStatus::HeatStress => "Detected: heat stress.",
            TreeStatus::ColdStress => "Detected: cold stress.",
            TreeStatus::FungalRisk => "Detected: fungal risk.",
            TreeStatus::DiseaseRisk => "Alert: disease risk detected.",
        }
        .to_string(),
    );
    lines.push(format!("Recommended action: {}", pair.action));

    if reading.temp_c > 35.0 {
        lines.push("It is very hot. Increase irrigation.".to_string());
    } else if reading.temp_c < 0.0 {
        lines.push("Frost risk. Protect the plants.".to_string());
    }
    if reading.humidite_pct > 80.0 {
        lines.push("High humidity: risk of fungal disease. Improve ventilation.".to_string());
    } else if reading.humidite_pct < 30.0 {
        lines.push("Very dry: check irrigation.".to_string());
    }
    if reading.pluie_mm > 10.0 {
        lines.push("Heavy rain. Check drainage.".to_string());
    }

    lines.into_iter().map(|line| line + "\n").collect()
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Raw echo of the main input fields, `"N/A"` when absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputEcho {
    pub temperature: Value,
    pub humidite: Value,
    pub pluie: Value,
}

impl InputEcho {
    fn from_input(input: &Value) -> Self {
        let echo = |key: &str| input.get(key).cloned().unwrap_or_else(|| Value::String("N/A".into()));
        Self {
            temperature: echo("temp_c"),
            humidite: echo("humidite_pct"),
            pluie: echo("pluie_mm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSuccess {
    success: bool,
    pub etat_olivier: TreeStatus,
    pub action_recommandee: RecommendedAction,
    pub conclusion: String,
    pub timestamp: String,
    pub input_data: InputEcho,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionFailure {
    success: bool,
    pub error: String,
    pub timestamp: String,
}

/// What the inference CLI prints for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success(PredictionSuccess),
    Failure(PredictionFailure),
}

impl PredictionResponse {
    pub fn failure(error: impl fmt::Display) -> Self {
        PredictionResponse::Failure(PredictionFailure {
            success: false,
            error: error.to_string(),
            timestamp: timestamp(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PredictionResponse::Success(_))
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A loaded model ready to answer requests.
#[derive(Debug, Clone)]
pub struct Predictor<C: MultiOutputClassifier = RandomForest> {
    classifier: C,
    encoders: TargetEncoders,
    schema: FeatureSchema,
}

impl Predictor<RandomForest> {
    /// Loads the artifacts managed by `manager`.
    pub fn load(manager: &ModelManager) -> Result<Self, ModelError> {
        Self::from_bundle(manager.load_bundle()?)
    }

    pub fn from_bundle(bundle: ModelBundle) -> Result<Self, ModelError> {
        Self::new(bundle.classifier, bundle.encoders, bundle.schema)
    }
}

impl<C: MultiOutputClassifier> Predictor<C> {
    pub fn new(classifier: C, encoders: TargetEncoders, schema: FeatureSchema) -> Result<Self, ModelError> {
        if classifier.n_features() != schema.len() {
            return Err(ModelError::SchemaMismatch {
                model: classifier.n_features(),
                schema: schema.len(),
            });
        }
        encoders.n_classes()?;
        Ok(Self {
            classifier,
            encoders,
            schema,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn encoders(&self) -> &TargetEncoders {
        &self.encoders
    }

    /// Predicts one label pair per feature row, aligned on the trained schema.
    pub fn predict_rows(&self, rows: &[FeatureRow]) -> Result<Vec<LabelPair>, PredictError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.schema.align_rows(rows);
        let codes = self.classifier.predict(x.view())?;
        if codes.ncols() < 2 {
            return Err(ClassifierError::PredictionError(format!("expected 2 outputs, got {}", codes.ncols())).into());
        }
        codes
            .rows()
            .into_iter()
            .map(|row| self.encoders.decode_pair(row[0], row[1]).map_err(PredictError::from))
            .collect()
    }

    pub fn predict_reading(&self, reading: &SensorReading) -> Result<LabelPair, PredictError> {
        let row = FeatureRow::from_record(&reading.to_record());
        let pair = self
            .predict_rows(std::slice::from_ref(&row))?
            .pop()
            .ok_or_else(|| ClassifierError::PredictionError("no prediction returned".into()))?;
        debug!("Predicted {} / {} for {:?}", pair.status, pair.action, reading);
        Ok(pair)
    }

    /// Batch prediction over records read from a CSV.
    pub fn predict_records(&self, records: &[WeatherRecord]) -> Result<Vec<LabelPair>, PredictError> {
        let rows: Vec<FeatureRow> = records.iter().map(FeatureRow::from_record).collect();
        self.predict_rows(&rows)
    }

    fn explain(&self, input: &Value) -> Result<PredictionSuccess, PredictError> {
        let reading = SensorReading::from_json(input)?;
        let pair = self.predict_reading(&reading)?;
        Ok(PredictionSuccess {
            success: true,
            etat_olivier: pair.status,
            action_recommandee: pair.action,
            conclusion: generate_conclusion(&pair, &reading),
            timestamp: timestamp(),
            input_data: InputEcho::from_input(input),
        })
    }

    /// Answers one request. Never fails; errors become a failure response.
    pub fn respond(&self, input: &Value) -> PredictionResponse {
        match self.explain(input) {
            Ok(success) => PredictionResponse::Success(success),
            Err(e) => {
                warn!("Prediction failed: {}", e);
                PredictionResponse::failure(e)
            }
        }
    }

    /// Like [`respond`](Self::respond), starting from the raw JSON text.
    pub fn respond_str(&self, raw: &str) -> PredictionResponse {
        match serde_json::from_str::<Value>(raw) {
            Ok(input) => self.respond(&input),
            Err(e) => {
                warn!("Rejected malformed input: {}", e);
                PredictionResponse::failure(PredictError::Json(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::BASE_FEATURES;
    use ndarray::{Array2, ArrayView2};
    use serde_json::json;

    /// Always answers with the same class codes.
    struct FixedClassifier {
        n_features: usize,
        codes: [usize; 2],
    }

    impl MultiOutputClassifier for FixedClassifier {
        fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<usize>, ClassifierError> {
            Ok(Array2::from_shape_fn((x.nrows(), 2), |(_, j)| self.codes[j]))
        }

        fn n_features(&self) -> usize {
            self.n_features
        }

        fn n_outputs(&self) -> usize {
            2
        }
    }

    fn predictor(codes: [usize; 2]) -> Predictor<FixedClassifier> {
        let schema = FeatureSchema::new(
            BASE_FEATURES
                .iter()
                .map(|s| s.to_string())
                .chain(["meteo_code_0".to_string(), "meteo_code_3".to_string()])
                .collect(),
        )
        .unwrap();
        let encoders = TargetEncoders::fit(&[
            LabelPair::default(),
            LabelPair {
                status: TreeStatus::HeatStress,
                action: RecommendedAction::ShadeCooling,
            },
        ]);
        let classifier = FixedClassifier {
            n_features: schema.len(),
            codes,
        };
        Predictor::new(classifier, encoders, schema).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let reading = SensorReading::from_json(&json!({"temp_c": 20})).unwrap();
        assert_eq!(reading.temp_max_c, 23.0);
        assert_eq!(reading.temp_min_c, 17.0);
        assert_eq!(reading.humidite_pct, 60.0);
        assert_eq!(reading.pluie_mm, 0.0);
        assert_eq!(reading.vitesse_vent_max_kmh, 10.0);
        assert_eq!(reading.code_meteo_dominant, 3);
    }

    #[test]
    fn test_numeric_strings_and_truncation() {
        let reading =
            SensorReading::from_json(&json!({"temp_c": "21,5", "humidite_pct": 64.9, "code_meteo_dominant": "61"}))
                .unwrap();
        assert_eq!(reading.temp_c, 21.5);
        assert_eq!(reading.humidite_pct, 64.0);
        assert_eq!(reading.code_meteo_dominant, 61);
    }

    #[test]
    fn test_reading_errors() {
        assert_eq!(SensorReading::from_json(&json!([1, 2])), Err(ReadingError::NotAnObject));
        assert_eq!(
            SensorReading::from_json(&json!({"humidite_pct": 50})),
            Err(ReadingError::MissingField("temp_c"))
        );
        assert!(matches!(
            SensorReading::from_json(&json!({"temp_c": "warm"})),
            Err(ReadingError::InvalidValue { field: "temp_c", .. })
        ));
        assert!(matches!(
            SensorReading::from_json(&json!({"temp_c": 20, "humidite_pct": 140})),
            Err(ReadingError::OutOfRange { field: "humidite_pct", .. })
        ));
        assert!(matches!(
            SensorReading::from_json(&json!({"temp_c": 20, "pluie_mm": -1})),
            Err(ReadingError::OutOfRange { field: "pluie_mm", .. })
        ));
    }

    #[test]
    fn test_conclusion_lines() {
        let reading = SensorReading::from_json(&json!({"temp_c": 38, "humidite_pct": 20, "pluie_mm": 12})).unwrap();
        let pair = LabelPair {
            status: TreeStatus::HeatStress,
            action: RecommendedAction::ShadeCooling,
        };
        assert_eq!(
            generate_conclusion(&pair, &reading),
            "Olive tree status: Heat Stress\n\
             Detected: heat stress.\n\
             Recommended action: Shade/Cooling\n\
             It is very hot. Increase irrigation.\n\
             Very dry: check irrigation.\n\
             Heavy rain. Check drainage.\n"
        );
    }

    #[test]
    fn test_conclusion_uses_resolved_humidity() {
        // humidity defaults to 60: no humidity advice
        let reading = SensorReading::from_json(&json!({"temp_c": -2})).unwrap();
        let conclusion = generate_conclusion(&LabelPair::default(), &reading);
        assert_eq!(
            conclusion,
            "Olive tree status: Healthy\n\
             Your olive tree is in good condition.\n\
             Recommended action: Do nothing\n\
             Frost risk. Protect the plants.\n"
        );
    }

    #[test]
    fn test_respond_success_shape() {
        // sorted classes: status [Healthy, Heat Stress], action [Do nothing, Shade/Cooling]
        let predictor = predictor([1, 1]);
        let response = predictor.respond(&json!({"temp_c": 38, "pluie_mm": 0}));
        assert!(response.is_success());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["etat_olivier"], json!("Heat Stress"));
        assert_eq!(value["action_recommandee"], json!("Shade/Cooling"));
        assert_eq!(value["input_data"]["temperature"], json!(38));
        assert_eq!(value["input_data"]["humidite"], json!("N/A"));
        assert_eq!(value["input_data"]["pluie"], json!(0));
        assert!(value["conclusion"].as_str().unwrap().starts_with("Olive tree status: Heat Stress\n"));
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_respond_failure_shape() {
        let predictor = predictor([0, 0]);
        let value = serde_json::to_value(predictor.respond_str("{not json")).unwrap();
        assert_eq!(value["success"], json!(false));
        assert!(value["error"].as_str().unwrap().starts_with("Invalid JSON input"));
        assert!(value.get("etat_olivier").is_none());

        let value = serde_json::to_value(predictor.respond(&json!({"temp_c": 20, "humidite_pct": -5}))).unwrap();
        assert_eq!(value["success"], json!(false));
        assert!(value["error"].as_str().unwrap().contains("humidite_pct"));
    }

    #[test]
    fn test_out_of_range_code_is_a_failure() {
        let predictor = predictor([7, 0]);
        let response = predictor.respond(&json!({"temp_c": 20}));
        assert!(!response.is_success());
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let schema = FeatureSchema::new(vec!["temperature_c".to_string()]).unwrap();
        let encoders = TargetEncoders::fit(&[LabelPair::default()]);
        let classifier = FixedClassifier {
            n_features: 4,
            codes: [0, 0],
        };
        assert!(matches!(
            Predictor::new(classifier, encoders, schema),
            Err(ModelError::SchemaMismatch { model: 4, schema: 1 })
        ));
    }
}
