use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use common::{
    error::AppError,
    storage::{
        jsonl::JsonlReader,
        types::{annotation_task::AnnotationTask, entity::IdToName, knowledge_base::KnowledgeBase},
    },
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::{
    pipeline::{GazetteerDetector, Pipeline, FOOD_LABEL, SPANS_KEY},
    tasks::TaskStream,
    tokens::add_tokens,
};

pub const RECIPE_NAME: &str = "food_linker.manual";
pub const VIEW_ID: &str = "blocks";
pub const FOOD_COLOR: &str = "#2592da";

#[derive(Debug, Clone)]
pub struct RecipeArgs {
    pub dataset: String,
    pub source: PathBuf,
    pub kb_loc: PathBuf,
    pub id_to_name: PathBuf,
    /// Extra food terms, one per line, added to the knowledge base aliases.
    pub extra_terms: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub view_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomTheme {
    pub labels: BTreeMap<String, String>,
}

/// Interface settings handed to the annotation tool with the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeConfig {
    pub buttons: Vec<String>,
    pub labels: Vec<String>,
    pub blocks: Vec<Block>,
    pub custom_theme: CustomTheme,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            buttons: vec!["accept".into(), "reject".into(), "ignore".into()],
            labels: vec![FOOD_LABEL.into()],
            blocks: vec![
                Block {
                    view_id: "ner_manual".into(),
                    text: None,
                },
                // Null text keeps the choice block from repeating the sentence.
                Block {
                    view_id: "choice".into(),
                    text: Some(Value::Null),
                },
            ],
            custom_theme: CustomTheme {
                labels: BTreeMap::from([(FOOD_LABEL.to_string(), FOOD_COLOR.to_string())]),
            },
        }
    }
}

pub struct RecipeComponents<S> {
    pub dataset: String,
    pub view_id: String,
    pub stream: S,
    pub config: RecipeConfig,
}

/// The serialisable part of [`RecipeComponents`].
#[derive(Debug, Serialize)]
pub struct RecipeManifest<'a> {
    pub recipe: &'static str,
    pub dataset: &'a str,
    pub view_id: &'a str,
    pub config: &'a RecipeConfig,
}

impl<S> RecipeComponents<S> {
    pub fn manifest(&self) -> RecipeManifest<'_> {
        RecipeManifest {
            recipe: RECIPE_NAME,
            dataset: &self.dataset,
            view_id: &self.view_id,
            config: &self.config,
        }
    }
}

/// Lazily reads annotation records from a JSONL file. Every record needs a
/// `text` field.
pub fn read_stream(path: impl AsRef<Path>) -> Result<JsonlReader<AnnotationTask>, AppError> {
    JsonlReader::open(path)
}

/// Reads a term list: one term per line, blank lines and `#` comments skipped.
pub fn load_terms(path: &Path) -> Result<Vec<String>, AppError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(path.display().to_string())
        } else {
            AppError::Io(err)
        }
    })?;

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

/// Entity linking annotation with candidate options drawn from the knowledge
/// base.
pub fn entity_linker_manual(args: RecipeArgs) -> Result<RecipeComponents<TaskStream>, AppError> {
    let kb = KnowledgeBase::from_disk(&args.kb_loc)?;

    let mut terms: Vec<String> = kb.aliases().map(ToString::to_string).collect();
    if let Some(path) = &args.extra_terms {
        terms.extend(load_terms(path)?);
    }
    let detector = GazetteerDetector::new(FOOD_LABEL, &terms);

    let mut nlp = Pipeline::blank();
    nlp.add_pipe(SPANS_KEY, detector);

    let id2name = IdToName::load(&args.id_to_name)?;
    let stream = add_tokens(read_stream(&args.source)?);

    info!(
        recipe = RECIPE_NAME,
        dataset = %args.dataset,
        source = %args.source.display(),
        terms = terms.len(),
        components = ?nlp.component_names().collect::<Vec<_>>(),
        entities = kb.entity_count(),
        names = id2name.len(),
        "Prepared entity linking recipe"
    );

    Ok(RecipeComponents {
        dataset: args.dataset,
        view_id: VIEW_ID.to_string(),
        stream: TaskStream::new(nlp, kb, id2name, stream),
        config: RecipeConfig::default(),
    })
}
