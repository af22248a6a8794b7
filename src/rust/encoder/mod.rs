//! One-hot feature encoding, target label encoding and the frozen schema.

mod features;
mod label;

pub use features::{
    encode_training_matrix, impute_column_means, weather_code_column, FeatureRow, FeatureSchema,
    BASE_FEATURES, WEATHER_CODE_PREFIX,
};
pub use label::{LabelEncoder, TargetEncoders, ACTION_TARGET, STATUS_TARGET};

use crate::labeler::UnknownLabel;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncoderError {
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),
    #[error("code {code} is outside the encoder range [0, {len})")]
    CodeOutOfRange { code: usize, len: usize },
    #[error("no encoder for target {0:?}")]
    MissingTarget(String),
    #[error("feature column {0:?} has no usable value")]
    EmptyColumn(String),
    #[error("cannot encode an empty dataset")]
    EmptyDataset,
    #[error("invalid feature schema: {0}")]
    InvalidSchema(String),
    #[error(transparent)]
    Label(#[from] UnknownLabel),
}
