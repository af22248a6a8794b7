use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::classifier::{ClassifierError, MultiOutputClassifier, RandomForest};
use crate::encoder::{EncoderError, FeatureSchema, TargetEncoders};

pub const MODEL_FILE: &str = "olive_tree_predictor_model.json";
pub const ENCODERS_FILE: &str = "target_encoders.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.txt";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Missing model artifact: {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Artifact {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Model expects {model} features but the feature list has {schema}")]
    SchemaMismatch { model: usize, schema: usize },
}

/// Everything a training run produces and inference needs.
#[derive(Debug)]
pub struct ModelBundle {
    pub classifier: RandomForest,
    pub encoders: TargetEncoders,
    pub schema: FeatureSchema,
}

impl ModelBundle {
    /// Checks that the three parts agree with each other.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.classifier.n_features() != self.schema.len() {
            return Err(ModelError::SchemaMismatch {
                model: self.classifier.n_features(),
                schema: self.schema.len(),
            });
        }
        let n_classes = self.encoders.n_classes()?;
        if n_classes.len() != self.classifier.n_outputs() {
            return Err(ModelError::Classifier(ClassifierError::ValidationError(format!(
                "model has {} outputs but {} target encoders",
                self.classifier.n_outputs(),
                n_classes.len()
            ))));
        }
        Ok(())
    }
}

/// Locates, saves and loads the artifacts of a trained model.
#[derive(Debug, Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("OLIVEWATCH_MODELS") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("olivewatch").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("olivewatch").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("olivewatch").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self { models_dir })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self) -> PathBuf {
        self.models_dir.join(MODEL_FILE)
    }

    pub fn get_encoders_path(&self) -> PathBuf {
        self.models_dir.join(ENCODERS_FILE)
    }

    pub fn get_feature_names_path(&self) -> PathBuf {
        self.models_dir.join(FEATURE_NAMES_FILE)
    }

    fn artifact_paths(&self) -> [PathBuf; 3] {
        [self.get_model_path(), self.get_encoders_path(), self.get_feature_names_path()]
    }

    pub fn is_model_trained(&self) -> bool {
        let paths = self.artifact_paths();
        log::debug!("Checking for trained model artifacts:");
        for path in &paths {
            log::debug!("  {:?} (exists: {})", path, path.exists());
        }
        paths.iter().all(|p| p.exists())
    }

    /// SHA-256 of a file, as lowercase hex.
    pub fn fingerprint(path: &Path) -> Result<String, ModelError> {
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Writes the three artifacts, replacing any previous ones.
    pub fn save_bundle(&self, bundle: &ModelBundle) -> Result<(), ModelError> {
        bundle.validate()?;
        fs::create_dir_all(&self.models_dir)?;

        let model_path = self.get_model_path();
        let json = serde_json::to_string(&bundle.classifier).map_err(|source| ModelError::Json {
            path: model_path.clone(),
            source,
        })?;
        fs::write(&model_path, json)?;

        let encoders_path = self.get_encoders_path();
        let json = serde_json::to_string_pretty(&bundle.encoders).map_err(|source| ModelError::Json {
            path: encoders_path.clone(),
            source,
        })?;
        fs::write(&encoders_path, json)?;

        fs::write(self.get_feature_names_path(), bundle.schema.to_lines())?;

        for path in self.artifact_paths() {
            log::info!("Saved {:?} (sha256 {})", path, Self::fingerprint(&path)?);
        }
        Ok(())
    }

    /// Loads a bundle, failing on the first artifact that is absent.
    pub fn load_bundle(&self) -> Result<ModelBundle, ModelError> {
        for path in self.artifact_paths() {
            if !path.exists() {
                log::debug!("Model artifact not found: {:?}", path);
                return Err(ModelError::MissingArtifact(path));
            }
            log::debug!("Loading {:?} (sha256 {})", path, Self::fingerprint(&path)?);
        }

        let model_path = self.get_model_path();
        let classifier: RandomForest = read_json(&model_path)?;
        let encoders: TargetEncoders = read_json(&self.get_encoders_path())?;
        let schema = FeatureSchema::from_lines(&fs::read_to_string(self.get_feature_names_path())?)?;

        let bundle = ModelBundle {
            classifier,
            encoders,
            schema,
        };
        bundle.validate()?;
        log::info!(
            "Loaded model from {:?}: {} trees, {} features",
            self.models_dir,
            bundle.classifier.n_trees(),
            bundle.schema.len()
        );
        Ok(bundle)
    }

    pub fn remove_artifacts(&self) -> Result<(), ModelError> {
        for path in self.artifact_paths() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| ModelError::Json {
        path: path.to_path_buf(),
        source,
    })
}
