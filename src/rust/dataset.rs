//! CSV loading and writing for raw and labeled weather tables.
//!
//! Every column is read as text and coerced through [`crate::weather`], so a
//! decimal comma or a stray word in a numeric cell never aborts a load.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use polars::prelude::*;

use crate::encoder::{ACTION_TARGET, STATUS_TARGET};
use crate::labeler::{LabelPair, UnknownLabel};
use crate::weather::{parse_decimal, parse_weather_code, WeatherRecord};

pub const DATE_COLUMN: &str = "date";
pub const CITY_COLUMN: &str = "city";
pub const WEATHER_CODE_COLUMN: &str = "code_meteo_dominant";

/// Columns a raw export must provide.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    DATE_COLUMN,
    CITY_COLUMN,
    "temperature_c",
    "temperature_max_c",
    "temperature_min_c",
    "humidite_pct",
    "pluie_mm",
];

/// Header of a batch prediction report.
pub const PREDICTION_COLUMNS: [&str; 7] = [
    DATE_COLUMN,
    CITY_COLUMN,
    "temperature_c",
    "humidite_pct",
    "pluie_mm",
    "etat_olivier_predit",
    "action_recommandee",
];

/// Numeric columns of [`WeatherRecord`], read with [`parse_decimal`].
pub const NUMERIC_COLUMNS: [&str; 7] = [
    "temperature_c",
    "temperature_max_c",
    "temperature_min_c",
    "humidite_pct",
    "pluie_mm",
    "precipitation_totale_mm",
    "vitesse_vent_max_kmh",
];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("{records} records but {labels} labels")]
    LengthMismatch { records: usize, labels: usize },
    #[error("Invalid label: {0}")]
    Label(#[from] UnknownLabel),
    #[error("CSV error: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn numeric_slot<'a>(record: &'a mut WeatherRecord, column: &str) -> Option<&'a mut f64> {
    match column {
        "temperature_c" => Some(&mut record.temperature_c),
        "temperature_max_c" => Some(&mut record.temperature_max_c),
        "temperature_min_c" => Some(&mut record.temperature_min_c),
        "humidite_pct" => Some(&mut record.humidite_pct),
        "pluie_mm" => Some(&mut record.pluie_mm),
        "precipitation_totale_mm" => Some(&mut record.precipitation_totale_mm),
        "vitesse_vent_max_kmh" => Some(&mut record.vitesse_vent_max_kmh),
        _ => None,
    }
}

fn numeric_value(record: &WeatherRecord, column: &str) -> Option<f64> {
    match column {
        "temperature_c" => Some(record.temperature_c),
        "temperature_max_c" => Some(record.temperature_max_c),
        "temperature_min_c" => Some(record.temperature_min_c),
        "humidite_pct" => Some(record.humidite_pct),
        "pluie_mm" => Some(record.pluie_mm),
        "precipitation_totale_mm" => Some(record.precipitation_totale_mm),
        "vitesse_vent_max_kmh" => Some(record.vitesse_vent_max_kmh),
        _ => None,
    }
}

/// Weather records plus the columns they were read from.
///
/// Columns outside [`WeatherRecord`] (coordinates, station ids...) are kept
/// verbatim and written back in their original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherTable {
    pub records: Vec<WeatherRecord>,
    columns: Vec<String>,
    passthrough: Vec<(String, Vec<Option<String>>)>,
}

impl WeatherTable {
    /// A table over `records` with the standard column layout.
    pub fn from_records(records: Vec<WeatherRecord>) -> Self {
        let columns = [DATE_COLUMN, CITY_COLUMN]
            .into_iter()
            .chain(NUMERIC_COLUMNS)
            .chain([WEATHER_CODE_COLUMN])
            .map(str::to_string)
            .collect();
        Self {
            records,
            columns,
            passthrough: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn passthrough_columns(&self) -> impl Iterator<Item = &str> {
        self.passthrough.iter().map(|(name, _)| name.as_str())
    }

    fn from_frame(df: &DataFrame, skip: &[&str]) -> Result<Self, DatasetError> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .filter(|n| !skip.contains(&n.as_str()))
            .collect();
        for required in REQUIRED_COLUMNS {
            if !names.iter().any(|n| n == required) {
                return Err(DatasetError::MissingColumn(required.to_string()));
            }
        }

        let mut records: Vec<WeatherRecord> = (0..df.height()).map(|_| WeatherRecord::empty("", "")).collect();
        let mut passthrough = Vec::new();
        for name in &names {
            let values = string_values(df, name)?;
            match name.as_str() {
                DATE_COLUMN => {
                    for (record, value) in records.iter_mut().zip(values) {
                        record.date = value.unwrap_or_default();
                    }
                }
                CITY_COLUMN => {
                    for (record, value) in records.iter_mut().zip(values) {
                        record.city = value.unwrap_or_default();
                    }
                }
                WEATHER_CODE_COLUMN => {
                    for (record, value) in records.iter_mut().zip(values) {
                        record.code_meteo_dominant = value.as_deref().and_then(parse_weather_code);
                    }
                }
                column if NUMERIC_COLUMNS.contains(&column) => {
                    for (record, value) in records.iter_mut().zip(values) {
                        if let Some(slot) = numeric_slot(record, column) {
                            *slot = value.as_deref().map_or(f64::NAN, parse_decimal);
                        }
                    }
                }
                _ => {
                    debug!("Carrying column {} through unchanged", name);
                    passthrough.push((name.clone(), values));
                }
            }
        }

        Ok(Self {
            records,
            columns: names,
            passthrough,
        })
    }

    fn to_frame(&self) -> Result<DataFrame, DatasetError> {
        let mut columns = Vec::with_capacity(self.columns.len() + 2);
        for name in &self.columns {
            let column = match name.as_str() {
                DATE_COLUMN => Column::new(
                    name.as_str().into(),
                    self.records.iter().map(|r| r.date.clone()).collect::<Vec<_>>(),
                ),
                CITY_COLUMN => Column::new(
                    name.as_str().into(),
                    self.records.iter().map(|r| r.city.clone()).collect::<Vec<_>>(),
                ),
                WEATHER_CODE_COLUMN => Column::new(
                    name.as_str().into(),
                    self.records.iter().map(|r| r.code_meteo_dominant).collect::<Vec<_>>(),
                ),
                column if NUMERIC_COLUMNS.contains(&column) => {
                    Column::new(name.as_str().into(), self.numeric_column(column))
                }
                column => {
                    if let Some((_, values)) = self.passthrough.iter().find(|(n, _)| n == column) {
                        Column::new(name.as_str().into(), values.clone())
                    } else {
                        continue;
                    }
                }
            };
            columns.push(column);
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Numeric column with `NaN` mapped to an empty cell.
    fn numeric_column(&self, column: &str) -> Vec<Option<f64>> {
        numeric_cells(&self.records, column)
    }
}

fn numeric_cells(records: &[WeatherRecord], column: &str) -> Vec<Option<f64>> {
    records
        .iter()
        .map(|r| numeric_value(r, column).filter(|v| !v.is_nan()))
        .collect()
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, DatasetError> {
    let column = df.column(name)?.str()?;
    Ok(column.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn read_string_frame(path: &Path) -> Result<DataFrame, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    info!("Reading {}", path.display());
    // A zero-row inference window keeps every column as text.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Read {} rows x {} columns", df.height(), df.width());
    Ok(df)
}

fn write_frame(path: &Path, df: &mut DataFrame) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Loads a raw weather export.
pub fn read_weather_csv(path: &Path) -> Result<WeatherTable, DatasetError> {
    let df = read_string_frame(path)?;
    WeatherTable::from_frame(&df, &[])
}

/// Writes `table` followed by the two label columns.
pub fn write_labeled_csv(path: &Path, table: &WeatherTable, labels: &[LabelPair]) -> Result<(), DatasetError> {
    if labels.len() != table.len() {
        return Err(DatasetError::LengthMismatch {
            records: table.len(),
            labels: labels.len(),
        });
    }
    let mut df = table.to_frame()?;
    df.with_column(Column::new(
        STATUS_TARGET.into(),
        labels.iter().map(|l| l.status.as_str()).collect::<Vec<_>>(),
    ))?;
    df.with_column(Column::new(
        ACTION_TARGET.into(),
        labels.iter().map(|l| l.action.as_str()).collect::<Vec<_>>(),
    ))?;
    write_frame(path, &mut df)
}

/// Writes one CSV row per record and its predicted labels to `writer`.
///
/// Missing numeric values become empty cells and text is quoted as needed.
pub fn write_predictions_csv<W: Write>(
    writer: W,
    records: &[WeatherRecord],
    predictions: &[LabelPair],
) -> Result<(), DatasetError> {
    if predictions.len() != records.len() {
        return Err(DatasetError::LengthMismatch {
            records: records.len(),
            labels: predictions.len(),
        });
    }
    let [date, city, temperature, humidity, rain, status, action] = PREDICTION_COLUMNS;
    let mut df = DataFrame::new(vec![
        Column::new(date.into(), records.iter().map(|r| r.date.as_str()).collect::<Vec<_>>()),
        Column::new(city.into(), records.iter().map(|r| r.city.as_str()).collect::<Vec<_>>()),
        Column::new(temperature.into(), numeric_cells(records, temperature)),
        Column::new(humidity.into(), numeric_cells(records, humidity)),
        Column::new(rain.into(), numeric_cells(records, rain)),
        Column::new(status.into(), predictions.iter().map(|p| p.status.as_str()).collect::<Vec<_>>()),
        Column::new(action.into(), predictions.iter().map(|p| p.action.as_str()).collect::<Vec<_>>()),
    ])?;
    CsvWriter::new(writer).include_header(true).finish(&mut df)?;
    debug!("Wrote {} prediction rows", df.height());
    Ok(())
}

/// Loads a labeled CSV back into records and their label pairs.
pub fn read_labeled_csv(path: &Path) -> Result<(WeatherTable, Vec<LabelPair>), DatasetError> {
    let df = read_string_frame(path)?;
    let table = WeatherTable::from_frame(&df, &[STATUS_TARGET, ACTION_TARGET])?;

    let mut target_values = Vec::with_capacity(2);
    for target in [STATUS_TARGET, ACTION_TARGET] {
        if !df.get_column_names().iter().any(|n| n.as_str() == target) {
            return Err(DatasetError::MissingColumn(target.to_string()));
        }
        target_values.push(string_values(&df, target)?);
    }
    let actions = target_values.pop().unwrap_or_default();
    let statuses = target_values.pop().unwrap_or_default();

    let labels = statuses
        .into_iter()
        .zip(actions)
        .map(|(status, action)| {
            Ok(LabelPair {
                status: status.unwrap_or_default().parse()?,
                action: action.unwrap_or_default().parse()?,
            })
        })
        .collect::<Result<Vec<_>, UnknownLabel>>()?;
    Ok((table, labels))
}
