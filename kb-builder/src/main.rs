use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use common::utils::{config::get_config, embedding::EmbeddingProvider};
use kb_builder::{create_dummy_kb, drop_header_row, load_entities, KbSettings};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Create the entity knowledge base from the sampled recipes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Entities CSV (defaults to <data_dir>/cake_recipes_sample.csv)
    #[arg(long)]
    entities: Option<PathBuf>,

    /// Knowledge base output directory (defaults to <data_dir>/<kb_dir>)
    #[arg(long)]
    kb_out: Option<PathBuf>,

    /// id-to-name JSON output (defaults to <data_dir>/id_to_name.json)
    #[arg(long)]
    id_to_name: Option<PathBuf>,

    /// Alias to register against every entity; repeat for several
    #[arg(long = "alias")]
    aliases: Vec<String>,

    /// Frequency recorded for every entity (overrides config)
    #[arg(long)]
    entity_frequency: Option<f32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let args = Args::parse();
    let config = get_config().context("loading configuration")?;

    let entities_path = args
        .entities
        .unwrap_or_else(|| config.data_file("cake_recipes_sample.csv"));
    let kb_out = args.kb_out.unwrap_or_else(|| config.kb_path());
    let id_to_name_path = args
        .id_to_name
        .unwrap_or_else(|| config.data_file("id_to_name.json"));

    info!(path = %entities_path.display(), "Loading entities");
    let mut entities = load_entities(&entities_path)
        .with_context(|| format!("loading entities from {}", entities_path.display()))?;
    drop_header_row(&mut entities);

    let embedder = EmbeddingProvider::from_config(&config)
        .await
        .context("initialising embedding provider")?;

    let mut settings = KbSettings {
        entity_frequency: args.entity_frequency.unwrap_or(config.entity_frequency),
        ..KbSettings::default()
    };
    if !args.aliases.is_empty() {
        settings.aliases = args.aliases;
    }

    info!(
        entities = entities.len(),
        backend = embedder.backend_label(),
        "Creating knowledge base"
    );
    let kb = create_dummy_kb(&embedder, &entities, &settings)
        .await
        .context("creating knowledge base")?;

    info!("Saving knowledge base and id-to-name mapping");
    kb.to_disk(&kb_out)
        .with_context(|| format!("writing knowledge base to {}", kb_out.display()))?;
    entities
        .id_to_name()
        .save(&id_to_name_path)
        .with_context(|| format!("writing {}", id_to_name_path.display()))?;

    println!(
        "Knowledge base with {} entities and {} aliases written to {} (names: {})",
        kb.entity_count(),
        kb.alias_count(),
        kb_out.display(),
        id_to_name_path.display()
    );

    Ok(())
}
