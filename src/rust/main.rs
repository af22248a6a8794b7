use clap::Parser;
use log::{error, warn};
use olivewatch::{init_logger, ModelError, ModelManager, Predictor};

/// Predicts olive tree status and a recommended action from one sensor reading.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Reading as a JSON object, e.g. '{"temp_c": 38, "humidite_pct": 30, "pluie_mm": 0}'
    reading: Option<String>,
}

fn load_predictor() -> Result<Predictor, ModelError> {
    let manager = ModelManager::new_default()?;
    Predictor::load(&manager)
}

fn main() -> anyhow::Result<()> {
    init_logger("warn");
    let args = Args::parse();

    let predictor = match load_predictor() {
        Ok(predictor) => predictor,
        Err(ModelError::MissingArtifact(path)) => {
            eprintln!("Error: file not found - {}", path.display());
            eprintln!("Expected directory: {}", ModelManager::get_default_models_dir().display());
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to load model: {}", e);
            std::process::exit(1);
        }
    };

    let Some(raw) = args.reading else {
        warn!("Model loaded. Usage: olivewatch '{{\"temp_c\": 25, \"humidite_pct\": 60, \"pluie_mm\": 0}}'");
        return Ok(());
    };

    let response = predictor.respond_str(&raw);
    println!("{}", response.to_pretty_json()?);
    Ok(())
}
