use std::path::PathBuf;

use annotation_recipe::{entity_linker_manual, RecipeArgs};
use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{
    storage::{jsonl::JsonlWriter, store::write_json_atomic},
    utils::config::get_config,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Annotation recipes for linking food mentions to the cake knowledge base.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write entity linking tasks and the annotation interface settings
    #[command(name = "food_linker.manual")]
    Manual {
        /// Dataset to save annotations to
        dataset: String,
        /// JSONL file with a `text` field per line
        source: PathBuf,
        /// Directory the knowledge base was saved to
        kb_loc: PathBuf,
        /// id-to-name JSON (defaults to <data_dir>/id_to_name.json)
        #[arg(long)]
        id_to_name: Option<PathBuf>,
        /// Extra food terms for span detection, one per line
        #[arg(long)]
        patterns: Option<PathBuf>,
        /// Output directory (defaults to <data_dir>)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let cli = Cli::parse();
    let config = get_config().context("loading configuration")?;

    match cli.command {
        Command::Manual {
            dataset,
            source,
            kb_loc,
            id_to_name,
            patterns,
            out_dir,
        } => {
            let out_dir = out_dir.unwrap_or_else(|| config.data_path());
            let args = RecipeArgs {
                dataset,
                source,
                kb_loc,
                id_to_name: id_to_name.unwrap_or_else(|| config.data_file("id_to_name.json")),
                extra_terms: patterns,
            };
            let source_display = args.source.display().to_string();

            let components = entity_linker_manual(args).context("preparing recipe")?;

            let tasks_path = out_dir.join(format!("{}.tasks.jsonl", components.dataset));
            let recipe_path = out_dir.join(format!("{}.recipe.json", components.dataset));

            write_json_atomic(&recipe_path, &components.manifest())
                .with_context(|| format!("writing {}", recipe_path.display()))?;

            let mut writer = JsonlWriter::create(&tasks_path)
                .with_context(|| format!("creating {}", tasks_path.display()))?;
            for task in components.stream {
                let task = task.with_context(|| format!("reading tasks from {source_display}"))?;
                writer
                    .write(&task)
                    .with_context(|| format!("writing {}", tasks_path.display()))?;
            }
            let written = writer
                .finish()
                .with_context(|| format!("flushing {}", tasks_path.display()))?;

            info!(tasks = written, path = %tasks_path.display(), "Task stream written");
            println!(
                "{written} tasks written to {} (interface settings: {})",
                tasks_path.display(),
                recipe_path.display()
            );
        }
    }

    Ok(())
}
