use std::path::Path;

use common::{
    error::AppError,
    storage::types::{
        entity::{EntityRecord, EntityTable},
        knowledge_base::KnowledgeBase,
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::{debug, info, warn};

/// Key of the entity produced by the CSV header row.
pub const HEADER_KEY: &str = "id";

pub const CAKE_TERMS: [&str; 8] = [
    "cake",
    "cakes",
    "-cakes",
    "glazed tarts",
    "petrified sponge-cake",
    "toasted oat-cake",
    "nut cakes",
    "-cake",
];

#[derive(Debug, Clone)]
pub struct KbSettings {
    pub entity_frequency: f32,
    pub aliases: Vec<String>,
}

impl Default for KbSettings {
    fn default() -> Self {
        Self {
            entity_frequency: 342.0,
            aliases: CAKE_TERMS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Reads `qid, name, description` rows. The header row is not skipped and
/// ends up as an entity keyed [`HEADER_KEY`].
pub fn load_entities(path: &Path) -> Result<EntityTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut table = EntityTable::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let (Some(id), Some(name), Some(description)) =
            (record.get(0), record.get(1), record.get(2))
        else {
            return Err(AppError::Validation(format!(
                "line {} of {} has {} columns; expected id, name and description",
                idx + 1,
                path.display(),
                record.len()
            )));
        };
        table.insert(EntityRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        });
    }

    debug!(path = %path.display(), rows = table.len(), "Loaded entity rows");
    Ok(table)
}

/// Removes the row the CSV header turned into an entity.
pub fn drop_header_row(table: &mut EntityTable) -> Option<EntityRecord> {
    let removed = table.remove(HEADER_KEY);
    if removed.is_none() {
        warn!(key = HEADER_KEY, "No header row found among loaded entities");
    }
    removed
}

/// Equal prior for each of `candidates` entities, chosen so the total stays
/// strictly below one.
pub fn uniform_prior(candidates: usize) -> f32 {
    1.0 / (candidates as f32 + 1.0)
}

/// Builds a knowledge base holding every entity of `entities`, with each
/// configured alias pointing at all of them under a uniform prior.
pub async fn create_dummy_kb(
    embedder: &EmbeddingProvider,
    entities: &EntityTable,
    settings: &KbSettings,
) -> Result<KnowledgeBase, AppError> {
    let mut kb = KnowledgeBase::new(embedder.dimension());

    let (ids, descriptions): (Vec<&str>, Vec<String>) = entities
        .descriptions()
        .map(|(id, description)| (id, description.to_string()))
        .unzip();
    let vectors = embedder.embed_batch(descriptions).await?;
    if vectors.len() != ids.len() {
        return Err(AppError::Embedding(format!(
            "{} backend returned {} vectors for {} descriptions",
            embedder.backend_label(),
            vectors.len(),
            ids.len()
        )));
    }

    for (id, vector) in ids.into_iter().zip(vectors) {
        kb.add_entity(id, settings.entity_frequency, vector)?;
    }

    let qids: Vec<&str> = entities.names().map(|(id, _)| id).collect();
    if qids.is_empty() {
        warn!("No entities loaded; knowledge base will have no aliases");
        return Ok(kb);
    }
    let probs = vec![uniform_prior(qids.len()); qids.len()];

    for alias in &settings.aliases {
        kb.add_alias(alias, qids.as_slice(), &probs)?;
    }

    info!(
        backend = embedder.backend_label(),
        model = ?embedder.model_code(),
        entities = kb.entity_count(),
        aliases = kb.alias_count(),
        vector_length = kb.entity_vector_length(),
        "Created knowledge base"
    );
    Ok(kb)
}
