use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use olivewatch::{
    init_logger, label_counts, label_records, normalize, read_labeled_csv, read_weather_csv, train, write_labeled_csv,
    write_predictions_csv, ForestConfig, ModelManager, Predictor, TrainingConfig,
};

/// Batch workflow: label raw weather exports, train the model, predict over a CSV.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the threshold rules to a raw export and write a labeled CSV
    Label {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = "labeled_olive_data.csv")]
        output: PathBuf,
    },
    /// Train the forest on a labeled CSV and save the artifacts
    Train {
        #[arg(short, long, default_value = "labeled_olive_data.csv")]
        input: PathBuf,
        /// Defaults to $OLIVEWATCH_MODELS or the platform data directory
        #[arg(long)]
        models_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 100)]
        trees: usize,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,
    },
    /// Predict status and action for every row of a raw export
    Predict {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
}

fn manager(models_dir: Option<PathBuf>) -> anyhow::Result<ModelManager> {
    let dir = models_dir.unwrap_or_else(ModelManager::get_default_models_dir);
    ModelManager::new(&dir).with_context(|| format!("cannot create model directory {}", dir.display()))
}

fn run_label(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let mut table = read_weather_csv(&input).with_context(|| format!("cannot read {}", input.display()))?;
    table.records = normalize(&table.records);
    let labels = label_records(&table.records);
    write_labeled_csv(&output, &table, &labels).with_context(|| format!("cannot write {}", output.display()))?;

    let counts = label_counts(&labels);
    println!("Labeled {} rows into {}", labels.len(), output.display());
    println!("\netat_olivier:");
    for (status, n) in counts.status {
        println!("  {:<22} {}", status.as_str(), n);
    }
    println!("\naction_recommandee:");
    for (action, n) in counts.action {
        println!("  {:<22} {}", action.as_str(), n);
    }
    Ok(())
}

fn run_train(input: PathBuf, manager: ModelManager, config: TrainingConfig) -> anyhow::Result<()> {
    let (table, labels) = read_labeled_csv(&input).with_context(|| format!("cannot read {}", input.display()))?;
    info!("Training on {} labeled rows", table.len());
    let outcome = train(&table.records, &labels, &config).context("training failed")?;
    manager.save_bundle(&outcome.bundle).context("cannot save model artifacts")?;

    let report = &outcome.report;
    println!("Trained on {} rows, held out {}", report.n_train, report.n_test);
    if let (Some(status), Some(action)) = (report.status_accuracy, report.action_accuracy) {
        println!("Accuracy (etat_olivier): {:.4}", status);
        println!("Accuracy (action_recommandee): {:.4}", action);
    }
    let info = outcome.bundle.classifier.info();
    println!(
        "{} trees per target, {} features, classes per target {:?}",
        info.n_trees, info.n_features, info.n_classes
    );
    println!("Model saved in {}", manager.models_dir().display());
    Ok(())
}

fn run_predict(input: PathBuf, manager: ModelManager) -> anyhow::Result<()> {
    let predictor = Predictor::load(&manager).context("cannot load model artifacts")?;
    let table = read_weather_csv(&input).with_context(|| format!("cannot read {}", input.display()))?;
    let predictions = predictor.predict_records(&table.records).context("prediction failed")?;

    write_predictions_csv(std::io::stdout().lock(), &table.records, &predictions)
        .context("cannot write predictions")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logger("info");
    match Cli::parse().command {
        Command::Label { input, output } => run_label(input, output),
        Command::Train {
            input,
            models_dir,
            trees,
            max_depth,
            seed,
            test_size,
        } => {
            let config = TrainingConfig {
                forest: ForestConfig {
                    n_trees: trees,
                    max_depth,
                    seed,
                    ..ForestConfig::default()
                },
                test_size,
                split_seed: seed,
            };
            run_train(input, manager(models_dir)?, config)
        }
        Command::Predict { input, models_dir } => run_predict(input, manager(models_dir)?),
    }
}
