use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::EncoderError;
use crate::labeler::{LabelPair, RecommendedAction, TreeStatus};

/// Column name of the status target in labeled data and encoder files.
pub const STATUS_TARGET: &str = "etat_olivier";
/// Column name of the action target in labeled data and encoder files.
pub const ACTION_TARGET: &str = "action_recommandee";

/// Bijection between category strings and dense integer codes.
///
/// Codes follow the sorted order of the categories seen at fit time, so
/// refitting on the same data always produces the same table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        Self {
            classes: distinct.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, value: &str) -> Result<usize, EncoderError> {
        self.classes
            .iter()
            .position(|class| class == value)
            .ok_or_else(|| EncoderError::UnknownCategory(value.to_string()))
    }

    pub fn decode(&self, code: usize) -> Result<&str, EncoderError> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(EncoderError::CodeOutOfRange { code, len: self.classes.len() })
    }
}

/// One [`LabelEncoder`] per target column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetEncoders {
    encoders: BTreeMap<String, LabelEncoder>,
}

impl TargetEncoders {
    pub fn fit(labels: &[LabelPair]) -> Self {
        let mut encoders = BTreeMap::new();
        encoders.insert(
            STATUS_TARGET.to_string(),
            LabelEncoder::fit(labels.iter().map(|l| l.status.as_str())),
        );
        encoders.insert(
            ACTION_TARGET.to_string(),
            LabelEncoder::fit(labels.iter().map(|l| l.action.as_str())),
        );
        Self { encoders }
    }

    pub fn get(&self, target: &str) -> Result<&LabelEncoder, EncoderError> {
        self.encoders
            .get(target)
            .ok_or_else(|| EncoderError::MissingTarget(target.to_string()))
    }

    /// Number of classes per output, in `[status, action]` order.
    pub fn n_classes(&self) -> Result<Vec<usize>, EncoderError> {
        Ok(vec![self.get(STATUS_TARGET)?.len(), self.get(ACTION_TARGET)?.len()])
    }

    /// Encodes labels into an `n x 2` matrix of `[status, action]` codes.
    pub fn encode_labels(&self, labels: &[LabelPair]) -> Result<Array2<usize>, EncoderError> {
        let status = self.get(STATUS_TARGET)?;
        let action = self.get(ACTION_TARGET)?;
        let mut y = Array2::zeros((labels.len(), 2));
        for (i, pair) in labels.iter().enumerate() {
            y[[i, 0]] = status.encode(pair.status.as_str())?;
            y[[i, 1]] = action.encode(pair.action.as_str())?;
        }
        Ok(y)
    }

    pub fn decode_pair(&self, status_code: usize, action_code: usize) -> Result<LabelPair, EncoderError> {
        let status: TreeStatus = self.get(STATUS_TARGET)?.decode(status_code)?.parse()?;
        let action: RecommendedAction = self.get(ACTION_TARGET)?.decode(action_code)?.parse()?;
        Ok(LabelPair { status, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_sorted_order() {
        let encoder = LabelEncoder::fit(["Irrigation", "Do nothing", "Irrigation", "Cover/Protect"]);
        assert_eq!(encoder.classes(), &["Cover/Protect", "Do nothing", "Irrigation"]);
        assert_eq!(encoder.encode("Do nothing").unwrap(), 1);
    }

    #[test]
    fn test_round_trip() {
        let encoder = LabelEncoder::fit(["Healthy", "Heat Stress", "Fungal Risk"]);
        for class in ["Healthy", "Heat Stress", "Fungal Risk"] {
            let code = encoder.encode(class).unwrap();
            assert_eq!(encoder.decode(code).unwrap(), class);
        }
    }

    #[test]
    fn test_decode_out_of_range_fails() {
        let encoder = LabelEncoder::fit(["Healthy"]);
        assert_eq!(
            encoder.decode(3),
            Err(EncoderError::CodeOutOfRange { code: 3, len: 1 })
        );
    }

    #[test]
    fn test_encode_unknown_fails() {
        let encoder = LabelEncoder::fit(["Healthy"]);
        assert!(matches!(encoder.encode("Frostbite"), Err(EncoderError::UnknownCategory(_))));
    }

    #[test]
    fn test_target_encoders_json_layout() {
        let labels = vec![
            LabelPair::default(),
            LabelPair { status: TreeStatus::HeatStress, action: RecommendedAction::ShadeCooling },
        ];
        let encoders = TargetEncoders::fit(&labels);
        let json = serde_json::to_value(&encoders).unwrap();
        assert_eq!(json["etat_olivier"]["classes"][0], "Healthy");
        assert_eq!(json["action_recommandee"]["classes"][1], "Shade/Cooling");

        let y = encoders.encode_labels(&labels).unwrap();
        assert_eq!(y[[1, 0]], 1);
        assert_eq!(encoders.decode_pair(y[[1, 0]], y[[1, 1]]).unwrap(), labels[1]);
    }
}
