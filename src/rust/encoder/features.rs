use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::EncoderError;
use crate::weather::WeatherRecord;

/// Numeric columns fed to the classifier, in training order.
pub const BASE_FEATURES: [&str; 6] = [
    "temperature_c",
    "temperature_max_c",
    "temperature_min_c",
    "humidite_pct",
    "pluie_mm",
    "vitesse_vent_max_kmh",
];

/// Prefix of the one-hot indicator columns built from the weather code.
pub const WEATHER_CODE_PREFIX: &str = "meteo_code_";

pub fn weather_code_column(code: i64) -> String {
    format!("{WEATHER_CODE_PREFIX}{code}")
}

/// A one-hot encoded record: named values, possibly missing some schema columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    values: BTreeMap<String, f64>,
}

impl FeatureRow {
    pub fn from_record(record: &WeatherRecord) -> Self {
        let base = [
            record.temperature_c,
            record.temperature_max_c,
            record.temperature_min_c,
            record.humidite_pct,
            record.pluie_mm,
            record.vitesse_vent_max_kmh,
        ];
        let mut values: BTreeMap<String, f64> = BASE_FEATURES
            .iter()
            .map(|name| name.to_string())
            .zip(base)
            .collect();
        if let Some(code) = record.code_meteo_dominant {
            values.insert(weather_code_column(code), 1.0);
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.values.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// The ordered feature-column list frozen at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self, EncoderError> {
        if names.is_empty() {
            return Err(EncoderError::InvalidSchema("feature list is empty".into()));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(EncoderError::InvalidSchema("blank feature name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(EncoderError::InvalidSchema(format!("duplicate feature {name:?}")));
            }
        }
        Ok(Self { names })
    }

    /// Base columns followed by one indicator per observed weather code, ascending.
    pub fn from_records(records: &[WeatherRecord]) -> Self {
        let codes: BTreeSet<i64> = records.iter().filter_map(|r| r.code_meteo_dominant).collect();
        let names = BASE_FEATURES
            .iter()
            .map(|name| name.to_string())
            .chain(codes.into_iter().map(weather_code_column))
            .collect();
        Self { names }
    }

    /// Parses the `feature_names.txt` format: one name per line.
    pub fn from_lines(text: &str) -> Result<Self, EncoderError> {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(names)
    }

    pub fn to_lines(&self) -> String {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Projects a row onto the schema. Absent columns are zero; `NaN` is kept.
    pub fn project(&self, row: &FeatureRow) -> Vec<f64> {
        self.names.iter().map(|name| row.get(name).unwrap_or(0.0)).collect()
    }

    /// Inference-time projection: like [`project`](Self::project) but `NaN` becomes zero.
    ///
    /// Columns of `row` that are not in the schema (an unseen weather code)
    /// are ignored.
    pub fn align(&self, row: &FeatureRow) -> Vec<f64> {
        let ignored: Vec<&str> = row.names().filter(|n| !self.names.iter().any(|s| s == n)).collect();
        if !ignored.is_empty() {
            debug!("Ignoring columns outside the trained schema: {:?}", ignored);
        }
        self.project(row)
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v })
            .collect()
    }

    pub fn align_rows(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut x = Array2::zeros((rows.len(), self.len()));
        for (mut out, row) in x.axis_iter_mut(Axis(0)).zip(rows) {
            for (slot, value) in out.iter_mut().zip(self.align(row)) {
                *slot = value;
            }
        }
        x
    }
}

/// Replaces `NaN` cells with their column mean and returns the means.
///
/// A column with no finite value cannot be imputed and fails the whole run.
pub fn impute_column_means(x: &mut Array2<f64>, schema: &FeatureSchema) -> Result<Vec<f64>, EncoderError> {
    let mut means = Vec::with_capacity(x.ncols());
    for (j, mut column) in x.axis_iter_mut(Axis(1)).enumerate() {
        let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(EncoderError::EmptyColumn(schema.names()[j].clone()));
        }
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        let missing = column.len() - finite.len();
        if missing > 0 {
            warn!("Imputing {} missing values in {} with mean {:.3}", missing, schema.names()[j], mean);
            column.mapv_inplace(|v| if v.is_finite() { v } else { mean });
        }
        means.push(mean);
    }
    Ok(means)
}

/// Builds the training matrix for `records` on `schema`, imputing missing numerics.
pub fn encode_training_matrix(records: &[WeatherRecord], schema: &FeatureSchema) -> Result<Array2<f64>, EncoderError> {
    if records.is_empty() {
        return Err(EncoderError::EmptyDataset);
    }
    let mut x = Array2::zeros((records.len(), schema.len()));
    for (mut out, record) in x.axis_iter_mut(Axis(0)).zip(records) {
        let projected = schema.project(&FeatureRow::from_record(record));
        for (slot, value) in out.iter_mut().zip(projected) {
            *slot = value;
        }
    }
    impute_column_means(&mut x, schema)?;
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: Option<i64>) -> WeatherRecord {
        let mut r = WeatherRecord::empty("2024-05-01", "Sfax");
        r.temperature_c = 22.0;
        r.temperature_max_c = 28.0;
        r.temperature_min_c = 16.0;
        r.humidite_pct = 60.0;
        r.pluie_mm = 0.0;
        r.vitesse_vent_max_kmh = 15.0;
        r.code_meteo_dominant = code;
        r
    }

    #[test]
    fn test_schema_from_records_orders_codes() {
        let schema = FeatureSchema::from_records(&[record(Some(61)), record(Some(3)), record(None), record(Some(3))]);
        assert_eq!(
            schema.names(),
            &[
                "temperature_c",
                "temperature_max_c",
                "temperature_min_c",
                "humidite_pct",
                "pluie_mm",
                "vitesse_vent_max_kmh",
                "meteo_code_3",
                "meteo_code_61",
            ]
        );
    }

    #[test]
    fn test_unseen_code_equals_absent_indicator() {
        let schema = FeatureSchema::from_records(&[record(Some(0)), record(Some(3))]);
        let unseen = schema.align(&FeatureRow::from_record(&record(Some(95))));
        let absent = schema.align(&FeatureRow::from_record(&record(None)));
        assert_eq!(unseen, absent);
        assert_eq!(&unseen[6..], &[0.0, 0.0]);
    }

    #[test]
    fn test_align_zero_fills_missing_and_nan() {
        let schema = FeatureSchema::from_records(&[record(Some(3))]);
        let mut row = FeatureRow::from_record(&record(Some(3)));
        row.remove("vitesse_vent_max_kmh");
        row.insert("pluie_mm", f64::NAN);
        let aligned = schema.align(&row);
        assert_eq!(aligned, vec![22.0, 28.0, 16.0, 60.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_training_matrix_imputes_means() {
        let mut a = record(Some(3));
        a.humidite_pct = f64::NAN;
        let mut b = record(Some(3));
        b.humidite_pct = 40.0;
        let mut c = record(Some(3));
        c.humidite_pct = 80.0;
        let records = vec![a, b, c];
        let schema = FeatureSchema::from_records(&records);
        let x = encode_training_matrix(&records, &schema).unwrap();
        assert_eq!(x[[0, 3]], 60.0);
        assert_eq!(x[[1, 3]], 40.0);
    }

    #[test]
    fn test_all_missing_column_is_fatal() {
        let mut a = record(None);
        a.vitesse_vent_max_kmh = f64::NAN;
        let records = vec![a];
        let schema = FeatureSchema::from_records(&records);
        let err = encode_training_matrix(&records, &schema).unwrap_err();
        assert_eq!(err, EncoderError::EmptyColumn("vitesse_vent_max_kmh".into()));
    }

    #[test]
    fn test_lines_round_trip() {
        let schema = FeatureSchema::from_records(&[record(Some(2))]);
        let parsed = FeatureSchema::from_lines(&schema.to_lines()).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = FeatureSchema::from_lines("pluie_mm\npluie_mm\n").unwrap_err();
        assert!(matches!(err, EncoderError::InvalidSchema(_)));
        assert!(FeatureSchema::from_lines("\n\n").is_err());
    }
}
