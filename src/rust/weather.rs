//! Weather records and the numeric normalisation applied before labeling.
//!
//! Raw station exports use a decimal comma and occasionally contain junk in
//! numeric cells. Everything here is tolerant: a value that cannot be read
//! becomes `NaN` (or `None` for the weather code) and the row is kept.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Number of rows (current day included) summed into `pluie_3j`.
pub const RAIN_WINDOW_DAYS: usize = 3;

/// One daily weather observation for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub date: String,
    pub city: String,
    pub temperature_c: f64,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    pub humidite_pct: f64,
    pub pluie_mm: f64,
    pub precipitation_totale_mm: f64,
    pub vitesse_vent_max_kmh: f64,
    pub code_meteo_dominant: Option<i64>,
    /// Trailing 3-day rainfall, filled in by [`normalize`].
    pub pluie_3j: f64,
}

impl WeatherRecord {
    /// A record with every numeric field unset.
    pub fn empty(date: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            city: city.into(),
            temperature_c: f64::NAN,
            temperature_max_c: f64::NAN,
            temperature_min_c: f64::NAN,
            humidite_pct: f64::NAN,
            pluie_mm: f64::NAN,
            precipitation_totale_mm: f64::NAN,
            vitesse_vent_max_kmh: f64::NAN,
            code_meteo_dominant: None,
            pluie_3j: f64::NAN,
        }
    }

    /// Parsed date used to order rows inside a location group.
    pub fn parsed_date(&self) -> Option<NaiveDateTime> {
        parse_date(&self.date)
    }
}

/// Parses a locale-formatted number such as `"12,5"`.
///
/// Empty or unparseable input yields `NaN`.
pub fn parse_decimal(raw: &str) -> f64 {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return f64::NAN;
    }
    cleaned.parse::<f64>().unwrap_or(f64::NAN)
}

/// Parses the dominant weather code. Integral decimals (`"61.0"`) are accepted.
pub fn parse_weather_code(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return Some(code);
    }
    let value = parse_decimal(trimmed);
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Sums the finite values of a window. `NaN` when none are finite.
fn window_sum(values: impl Iterator<Item = f64>) -> f64 {
    let mut seen = false;
    let mut total = 0.0;
    for value in values.filter(|v| !v.is_nan()) {
        seen = true;
        total += value;
    }
    if seen {
        total
    } else {
        f64::NAN
    }
}

/// Computes `pluie_3j` for every record, in place.
///
/// Rows are grouped by `city` and ordered by date inside each group (stable, so
/// rows whose dates cannot be parsed keep their file order). The window holds
/// the current row and up to two preceding rows; the first rows of a group sum
/// over fewer days.
pub fn rolling_rain_3d(records: &mut [WeatherRecord]) {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups.entry(record.city.as_str()).or_default().push(idx);
    }

    let mut sums = vec![f64::NAN; records.len()];
    for indices in groups.into_values() {
        let mut ordered = indices;
        ordered.sort_by_key(|&idx| records[idx].parsed_date());
        for (pos, &idx) in ordered.iter().enumerate() {
            let start = (pos + 1).saturating_sub(RAIN_WINDOW_DAYS);
            sums[idx] = window_sum(ordered[start..=pos].iter().map(|&i| records[i].pluie_mm));
        }
    }

    for (record, sum) in records.iter_mut().zip(sums) {
        record.pluie_3j = sum;
    }
}

/// Returns a normalised copy of `records` with `pluie_3j` filled in.
pub fn normalize(records: &[WeatherRecord]) -> Vec<WeatherRecord> {
    let mut out = records.to_vec();
    rolling_rain_3d(&mut out);
    out
}
