use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use common::utils::config::get_config;
use corpus_converter::{convert_training_data, sample_recipes, ConvertSettings, SampleSettings};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Convert the raw corpora into annotation-ready files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Raw sentence corpus (defaults to <data_dir>/victorian_lit.csv)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// JSONL output (defaults to <data_dir>/training_data.jsonl)
    #[arg(long)]
    training_data: Option<PathBuf>,

    /// Recipes CSV to sample (defaults to <data_dir>/cake_recipes.csv)
    #[arg(long)]
    recipes: Option<PathBuf>,

    /// Sampled recipes output (defaults to <data_dir>/cake_recipes_sample.csv)
    #[arg(long)]
    recipes_sample: Option<PathBuf>,

    /// Keyword that keeps a sentence; repeat for several
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    /// Number of recipes to sample (overrides config)
    #[arg(long)]
    sample_size: Option<usize>,

    /// Sampling seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let args = Args::parse();
    let config = get_config().context("loading configuration")?;

    let corpus = args
        .corpus
        .unwrap_or_else(|| config.data_file("victorian_lit.csv"));
    let training_data = args
        .training_data
        .unwrap_or_else(|| config.data_file("training_data.jsonl"));

    let mut convert_settings = ConvertSettings::default();
    if !args.keywords.is_empty() {
        convert_settings.keywords = args.keywords;
    }

    info!(input = %corpus.display(), "Formatting corpus as JSONL");
    let summary = convert_training_data(&corpus, &training_data, &convert_settings)
        .with_context(|| format!("converting {}", corpus.display()))?;

    let recipes = args
        .recipes
        .unwrap_or_else(|| config.data_file("cake_recipes.csv"));
    let recipes_sample = args
        .recipes_sample
        .unwrap_or_else(|| config.data_file("cake_recipes_sample.csv"));
    let sample_settings = SampleSettings {
        size: args.sample_size.unwrap_or(config.sample_size),
        seed: args.seed.unwrap_or(config.sample_seed),
        ..SampleSettings::default()
    };

    info!(input = %recipes.display(), "Sizing down recipes");
    let sampled = sample_recipes(&recipes, &recipes_sample, &sample_settings)
        .with_context(|| format!("sampling {}", recipes.display()))?;

    println!(
        "Wrote {} of {} sentences to {} and {sampled} recipes to {}",
        summary.rows_written,
        summary.rows_read,
        training_data.display(),
        recipes_sample.display()
    );

    Ok(())
}
