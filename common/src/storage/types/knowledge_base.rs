use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::AppError,
    storage::store::{read_json, write_json_atomic},
};

pub const KB_FILE_NAME: &str = "knowledge_base.json";
const KB_FORMAT_VERSION: u32 = 1;

// Slack for float rounding when summing alias priors.
const PRIOR_SUM_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbEntity {
    pub id: String,
    pub freq: f32,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasCandidate {
    pub entity: String,
    pub prior_prob: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbAlias {
    pub alias: String,
    pub candidates: Vec<AliasCandidate>,
}

/// A candidate entity proposed for a mention, borrowed from the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    pub entity: &'a str,
    pub alias: &'a str,
    pub prior_prob: f32,
    pub entity_freq: f32,
    pub entity_vector: &'a [f32],
}

#[derive(Serialize, Deserialize)]
struct KnowledgeBaseFile {
    version: u32,
    entity_vector_length: usize,
    entities: Vec<KbEntity>,
    aliases: Vec<KbAlias>,
}

/// In-memory lookup knowledge base.
///
/// Entities carry a fixed-length vector and a frequency. Aliases map a
/// surface string to candidate entities with prior probabilities that sum
/// to at most one.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entity_vector_length: usize,
    entities: Vec<KbEntity>,
    entity_index: HashMap<String, usize>,
    aliases: Vec<KbAlias>,
    alias_index: HashMap<String, usize>,
}

impl KnowledgeBase {
    pub fn new(entity_vector_length: usize) -> Self {
        Self {
            entity_vector_length,
            entities: Vec::new(),
            entity_index: HashMap::new(),
            aliases: Vec::new(),
            alias_index: HashMap::new(),
        }
    }

    pub fn entity_vector_length(&self) -> usize {
        self.entity_vector_length
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.entity_index.contains_key(id)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.alias_index.contains_key(alias)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|entity| entity.id.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(|alias| alias.alias.as_str())
    }

    pub fn entity(&self, id: &str) -> Option<&KbEntity> {
        self.entity_index
            .get(id)
            .and_then(|&slot| self.entities.get(slot))
    }

    pub fn get_vector(&self, id: &str) -> Option<&[f32]> {
        self.entity(id).map(|entity| entity.vector.as_slice())
    }

    /// Adds an entity. Returns `Ok(false)` when the id is already present.
    pub fn add_entity(
        &mut self,
        id: impl Into<String>,
        freq: f32,
        vector: Vec<f32>,
    ) -> Result<bool, AppError> {
        let id = id.into();
        if vector.len() != self.entity_vector_length {
            return Err(AppError::Validation(format!(
                "entity '{id}' has a vector of length {} but the knowledge base expects {}",
                vector.len(),
                self.entity_vector_length
            )));
        }
        if self.entity_index.contains_key(&id) {
            warn!(entity = %id, "Entity already in knowledge base; skipping");
            return Ok(false);
        }

        self.entity_index.insert(id.clone(), self.entities.len());
        self.entities.push(KbEntity { id, freq, vector });
        Ok(true)
    }

    /// Registers `alias` against `entities` with matching `probabilities`.
    ///
    /// Every entity must already exist and the probabilities must sum to at
    /// most one. Returns `Ok(false)` when the alias is already registered.
    pub fn add_alias<S: AsRef<str>>(
        &mut self,
        alias: &str,
        entities: &[S],
        probabilities: &[f32],
    ) -> Result<bool, AppError> {
        if entities.len() != probabilities.len() {
            return Err(AppError::Validation(format!(
                "alias '{alias}' lists {} entities but {} probabilities",
                entities.len(),
                probabilities.len()
            )));
        }

        // f32 accumulation drifts past the tolerance on large candidate sets.
        let total: f64 = probabilities.iter().map(|&p| f64::from(p)).sum();
        if total > 1.0 + PRIOR_SUM_TOLERANCE {
            return Err(AppError::Validation(format!(
                "probabilities for alias '{alias}' sum to {total}, which exceeds 1"
            )));
        }
        if let Some(prob) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(AppError::Validation(format!(
                "alias '{alias}' has an out-of-range probability {prob}"
            )));
        }
        if let Some(missing) = entities
            .iter()
            .map(|entity| entity.as_ref())
            .find(|entity: &&str| !self.entity_index.contains_key(*entity))
        {
            return Err(AppError::NotFound(format!(
                "entity '{missing}' referenced by alias '{alias}'"
            )));
        }

        if self.alias_index.contains_key(alias) {
            warn!(alias, "Alias already in knowledge base; skipping");
            return Ok(false);
        }

        let candidates = entities
            .iter()
            .zip(probabilities)
            .map(|(entity, &prior_prob)| AliasCandidate {
                entity: entity.as_ref().to_string(),
                prior_prob,
            })
            .collect();

        self.alias_index.insert(alias.to_string(), self.aliases.len());
        self.aliases.push(KbAlias {
            alias: alias.to_string(),
            candidates,
        });
        Ok(true)
    }

    fn alias(&self, alias: &str) -> Option<&KbAlias> {
        self.alias_index
            .get(alias)
            .and_then(|&slot| self.aliases.get(slot))
    }

    /// Candidates registered for exactly `alias`, in registration order.
    pub fn get_alias_candidates(&self, alias: &str) -> Vec<Candidate<'_>> {
        let Some(entry) = self.alias(alias) else {
            return Vec::new();
        };

        entry
            .candidates
            .iter()
            .filter_map(|candidate| {
                self.entity(&candidate.entity).map(|entity| Candidate {
                    entity: entity.id.as_str(),
                    alias: entry.alias.as_str(),
                    prior_prob: candidate.prior_prob,
                    entity_freq: entity.freq,
                    entity_vector: entity.vector.as_slice(),
                })
            })
            .collect()
    }

    /// Candidates for a detected mention: the exact text first, then with
    /// whitespace runs collapsed to single spaces, then that form lowercased.
    pub fn get_candidates(&self, mention: &str) -> Vec<Candidate<'_>> {
        let exact = self.get_alias_candidates(mention);
        if !exact.is_empty() {
            return exact;
        }

        let collapsed = mention.split_whitespace().collect::<Vec<_>>().join(" ");
        let lowered = collapsed.to_lowercase();
        for key in [collapsed, lowered] {
            if key == mention {
                continue;
            }
            let candidates = self.get_alias_candidates(&key);
            if !candidates.is_empty() {
                return candidates;
            }
        }
        Vec::new()
    }

    pub fn to_disk(&self, dir: &Path) -> Result<(), AppError> {
        let file = KnowledgeBaseFile {
            version: KB_FORMAT_VERSION,
            entity_vector_length: self.entity_vector_length,
            entities: self.entities.clone(),
            aliases: self.aliases.clone(),
        };
        write_json_atomic(&dir.join(KB_FILE_NAME), &file)?;

        info!(
            path = %dir.display(),
            entities = self.entities.len(),
            aliases = self.aliases.len(),
            "Knowledge base written"
        );
        Ok(())
    }

    /// Loads a knowledge base written by [`KnowledgeBase::to_disk`],
    /// re-checking every entity and alias.
    pub fn from_disk(dir: &Path) -> Result<Self, AppError> {
        let file: KnowledgeBaseFile = read_json(&dir.join(KB_FILE_NAME))?;
        if file.version != KB_FORMAT_VERSION {
            return Err(AppError::Validation(format!(
                "unsupported knowledge base format version {} in {}",
                file.version,
                dir.display()
            )));
        }

        let mut kb = Self::new(file.entity_vector_length);
        for entity in file.entities {
            kb.add_entity(entity.id, entity.freq, entity.vector)?;
        }
        for alias in file.aliases {
            let (entities, probabilities): (Vec<String>, Vec<f32>) = alias
                .candidates
                .into_iter()
                .map(|candidate| (candidate.entity, candidate.prior_prob))
                .unzip();
            kb.add_alias(&alias.alias, entities.as_slice(), &probabilities)?;
        }

        info!(
            path = %dir.display(),
            entities = kb.entity_count(),
            aliases = kb.alias_count(),
            "Knowledge base loaded"
        );
        Ok(kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new(3);
        kb.add_entity("Q1", 342.0, vec![1.0, 0.0, 0.0]).unwrap();
        kb.add_entity("Q2", 342.0, vec![0.0, 1.0, 0.0]).unwrap();
        kb.add_alias("cake", &["Q1", "Q2"], &[0.4, 0.3]).unwrap();
        kb
    }

    #[test]
    fn rejects_vector_of_wrong_length() {
        let mut kb = KnowledgeBase::new(3);
        let err = kb.add_entity("Q1", 1.0, vec![1.0]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(kb.entity_count(), 0);
    }

    #[test]
    fn duplicate_entity_and_alias_are_skipped() {
        let mut kb = small_kb();
        assert!(!kb.add_entity("Q1", 1.0, vec![0.0, 0.0, 1.0]).unwrap());
        assert!(!kb.add_alias("cake", &["Q1"], &[0.9]).unwrap());

        assert_eq!(kb.entity_count(), 2);
        assert_eq!(kb.get_vector("Q1"), Some(&[1.0, 0.0, 0.0][..]));
        assert!((kb.get_alias_candidates("cake")[0].prior_prob - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_priors_summing_above_one() {
        let mut kb = small_kb();
        let err = kb.add_alias("tart", &["Q1", "Q2"], &[0.6, 0.5]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!kb.contains_alias("tart"));
    }

    #[test]
    fn rejects_unknown_entities_and_mismatched_lengths() {
        let mut kb = small_kb();
        assert!(matches!(
            kb.add_alias("bun", &["Q404"], &[0.5]),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            kb.add_alias("bun", &["Q1", "Q2"], &[0.5]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn candidates_follow_registration_order() {
        let kb = small_kb();
        let candidates = kb.get_alias_candidates("cake");

        let ids: Vec<&str> = candidates.iter().map(|c| c.entity).collect();
        assert_eq!(ids, vec!["Q1", "Q2"]);
        assert_eq!(candidates[1].alias, "cake");
        assert_eq!(candidates[1].entity_vector, &[0.0, 1.0, 0.0]);
        assert!((candidates[1].entity_freq - 342.0).abs() < f32::EPSILON);
        assert!(kb.get_alias_candidates("pie").is_empty());
    }

    #[test]
    fn mention_lookup_falls_back_to_lowercase() {
        let kb = small_kb();
        assert_eq!(kb.get_candidates("Cake").len(), 2);
        assert_eq!(kb.get_candidates("cake").len(), 2);
        assert!(kb.get_alias_candidates("Cake").is_empty());
        assert!(kb.get_candidates("Pie").is_empty());
    }

    #[test]
    fn mention_lookup_collapses_whitespace() {
        let mut kb = small_kb();
        kb.add_alias("nut cakes", &["Q2"], &[0.5]).unwrap();

        assert_eq!(kb.get_candidates("nut  cakes").len(), 1);
        assert_eq!(kb.get_candidates("Nut\ncakes").len(), 1);
        assert_eq!(kb.get_candidates(" nut \t cakes ")[0].entity, "Q2");
        assert!(kb.get_candidates("nutcakes").is_empty());
    }

    #[test]
    fn many_uniform_priors_are_accepted() {
        let n = 200_000usize;
        let mut kb = KnowledgeBase::new(1);
        let ids: Vec<String> = (0..n).map(|i| format!("Q{i}")).collect();
        for id in &ids {
            kb.add_entity(id.as_str(), 1.0, vec![0.0]).unwrap();
        }
        #[allow(clippy::cast_possible_truncation)]
        let prior = (1.0 / (n as f64 + 1.0)) as f32;
        let probs = vec![prior; n];

        assert!(kb.add_alias("cake", ids.as_slice(), &probs).unwrap());
        assert_eq!(kb.get_alias_candidates("cake").len(), n);
    }

    #[test]
    fn persists_to_directory_and_reloads() {
        let dir = tempdir().unwrap();
        let kb_dir = dir.path().join("cake_kb");
        let kb = small_kb();

        kb.to_disk(&kb_dir).unwrap();
        assert!(kb_dir.join(KB_FILE_NAME).exists());

        let loaded = KnowledgeBase::from_disk(&kb_dir).unwrap();
        assert_eq!(loaded.entity_vector_length(), 3);
        assert_eq!(loaded.entity_ids().collect::<Vec<_>>(), vec!["Q1", "Q2"]);
        assert_eq!(loaded.aliases().collect::<Vec<_>>(), vec!["cake"]);
        assert_eq!(loaded.get_alias_candidates("cake"), kb.get_alias_candidates("cake"));
    }

    #[test]
    fn loading_rejects_tampered_priors() {
        let dir = tempdir().unwrap();
        let kb_dir = dir.path().join("cake_kb");
        small_kb().to_disk(&kb_dir).unwrap();

        let path = kb_dir.join(KB_FILE_NAME);
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.replace("0.4", "0.9")).unwrap();

        assert!(matches!(
            KnowledgeBase::from_disk(&kb_dir),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            KnowledgeBase::from_disk(&dir.path().join("absent")),
            Err(AppError::NotFound(_))
        ));
    }
}
