//! Agronomic threshold rules that label each weather record with a tree
//! status and a recommended action.
//!
//! Rules run in a fixed order. Cold and heat stress always overwrite; the
//! weaker signals (water stress, fungal risk, disease risk) only fill a field
//! that still holds its baseline value. Status and action are guarded
//! independently.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::weather::WeatherRecord;

pub const COLD_MIN_TEMP_C: f64 = 5.0;
pub const HEAT_MAX_TEMP_C: f64 = 35.0;
pub const DRY_HUMIDITY_PCT: f64 = 40.0;
pub const DRY_RAIN_MM: f64 = 1.0;
pub const FUNGAL_RAIN_3D_MM: f64 = 10.0;
pub const HUMID_PCT: f64 = 80.0;
pub const WARM_MEAN_TEMP_C: f64 = 20.0;

/// Error returned when a label string is not part of the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} label: {value:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

/// Health assessment of an olive tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TreeStatus {
    #[serde(rename = "Healthy")]
    Healthy,
    #[serde(rename = "Cold Stress")]
    ColdStress,
    #[serde(rename = "Heat Stress")]
    HeatStress,
    #[serde(rename = "Water Stress")]
    WaterStress,
    #[serde(rename = "Fungal Risk")]
    FungalRisk,
    #[serde(rename = "Disease Risk")]
    DiseaseRisk,
}

impl TreeStatus {
    pub const ALL: [TreeStatus; 6] = [
        TreeStatus::Healthy,
        TreeStatus::ColdStress,
        TreeStatus::HeatStress,
        TreeStatus::WaterStress,
        TreeStatus::FungalRisk,
        TreeStatus::DiseaseRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TreeStatus::Healthy => "Healthy",
            TreeStatus::ColdStress => "Cold Stress",
            TreeStatus::HeatStress => "Heat Stress",
            TreeStatus::WaterStress => "Water Stress",
            TreeStatus::FungalRisk => "Fungal Risk",
            TreeStatus::DiseaseRisk => "Disease Risk",
        }
    }
}

impl fmt::Display for TreeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreeStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TreeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| UnknownLabel { kind: "status", value: s.to_string() })
    }
}

/// Intervention recommended alongside a [`TreeStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecommendedAction {
    #[serde(rename = "Do nothing")]
    DoNothing,
    #[serde(rename = "Cover/Protect")]
    CoverProtect,
    #[serde(rename = "Shade/Cooling")]
    ShadeCooling,
    #[serde(rename = "Irrigation")]
    Irrigation,
    #[serde(rename = "Preventive Treatment")]
    PreventiveTreatment,
    #[serde(rename = "Increased Monitoring")]
    IncreasedMonitoring,
}

impl RecommendedAction {
    pub const ALL: [RecommendedAction; 6] = [
        RecommendedAction::DoNothing,
        RecommendedAction::CoverProtect,
        RecommendedAction::ShadeCooling,
        RecommendedAction::Irrigation,
        RecommendedAction::PreventiveTreatment,
        RecommendedAction::IncreasedMonitoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::DoNothing => "Do nothing",
            RecommendedAction::CoverProtect => "Cover/Protect",
            RecommendedAction::ShadeCooling => "Shade/Cooling",
            RecommendedAction::Irrigation => "Irrigation",
            RecommendedAction::PreventiveTreatment => "Preventive Treatment",
            RecommendedAction::IncreasedMonitoring => "Increased Monitoring",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendedAction {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecommendedAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s.trim())
            .ok_or_else(|| UnknownLabel { kind: "action", value: s.to_string() })
    }
}

/// The (status, action) pair assigned to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelPair {
    pub status: TreeStatus,
    pub action: RecommendedAction,
}

impl Default for LabelPair {
    fn default() -> Self {
        Self {
            status: TreeStatus::Healthy,
            action: RecommendedAction::DoNothing,
        }
    }
}

/// A field that remembers whether a rule has claimed it.
#[derive(Debug, Clone, Copy)]
struct Guarded<T> {
    value: T,
    claimed: bool,
}

impl<T: Copy> Guarded<T> {
    fn baseline(value: T) -> Self {
        Self { value, claimed: false }
    }

    fn overwrite(&mut self, value: T) {
        self.value = value;
        self.claimed = true;
    }

    fn fill(&mut self, value: T) {
        if !self.claimed {
            self.overwrite(value);
        }
    }
}

/// How a rule writes into the label pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    Overwrite,
    FillBaseline,
}

struct Rule {
    priority: Priority,
    status: TreeStatus,
    action: RecommendedAction,
    applies: fn(&WeatherRecord) -> bool,
}

// Comparisons against NaN are false, so missing measurements never trigger a rule.
const RULES: [Rule; 5] = [
    Rule {
        priority: Priority::Overwrite,
        status: TreeStatus::ColdStress,
        action: RecommendedAction::CoverProtect,
        applies: |r| r.temperature_min_c < COLD_MIN_TEMP_C,
    },
    Rule {
        priority: Priority::Overwrite,
        status: TreeStatus::HeatStress,
        action: RecommendedAction::ShadeCooling,
        applies: |r| r.temperature_max_c > HEAT_MAX_TEMP_C,
    },
    Rule {
        priority: Priority::FillBaseline,
        status: TreeStatus::WaterStress,
        action: RecommendedAction::Irrigation,
        applies: |r| r.humidite_pct < DRY_HUMIDITY_PCT && r.pluie_mm < DRY_RAIN_MM,
    },
    Rule {
        priority: Priority::FillBaseline,
        status: TreeStatus::FungalRisk,
        action: RecommendedAction::PreventiveTreatment,
        applies: |r| r.pluie_3j > FUNGAL_RAIN_3D_MM,
    },
    Rule {
        priority: Priority::FillBaseline,
        status: TreeStatus::DiseaseRisk,
        action: RecommendedAction::IncreasedMonitoring,
        applies: |r| r.humidite_pct > HUMID_PCT && r.temperature_c > WARM_MEAN_TEMP_C,
    },
];

/// Labels a single record. `pluie_3j` must already be computed.
pub fn label_record(record: &WeatherRecord) -> LabelPair {
    let baseline = LabelPair::default();
    let mut status = Guarded::baseline(baseline.status);
    let mut action = Guarded::baseline(baseline.action);

    for rule in RULES.iter().filter(|rule| (rule.applies)(record)) {
        match rule.priority {
            Priority::Overwrite => {
                status.overwrite(rule.status);
                action.overwrite(rule.action);
            }
            Priority::FillBaseline => {
                status.fill(rule.status);
                action.fill(rule.action);
            }
        }
    }

    LabelPair {
        status: status.value,
        action: action.value,
    }
}

/// Labels every record, preserving order.
pub fn label_records(records: &[WeatherRecord]) -> Vec<LabelPair> {
    records.iter().map(label_record).collect()
}

/// Value counts of the generated labels, most frequent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCounts {
    pub status: Vec<(TreeStatus, usize)>,
    pub action: Vec<(RecommendedAction, usize)>,
}

fn sorted_counts<T: Ord + Copy>(counts: BTreeMap<T, usize>) -> Vec<(T, usize)> {
    let mut out: Vec<(T, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    out
}

pub fn label_counts(labels: &[LabelPair]) -> LabelCounts {
    let mut status = BTreeMap::new();
    let mut action = BTreeMap::new();
    for pair in labels {
        *status.entry(pair.status).or_insert(0) += 1;
        *action.entry(pair.action).or_insert(0) += 1;
    }
    LabelCounts {
        status: sorted_counts(status),
        action: sorted_counts(action),
    }
}
