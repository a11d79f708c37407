use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::store::{read_json, write_json_atomic},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Entities keyed by id, iterated in first-insertion order.
///
/// Exposes the two parallel id→name and id→description mappings. Inserting
/// an id twice replaces its values but keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    order: Vec<String>,
    names: HashMap<String, String>,
    descriptions: HashMap<String, String>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: EntityRecord) {
        if !self.names.contains_key(&record.id) {
            self.order.push(record.id.clone());
        }
        self.names.insert(record.id.clone(), record.name);
        self.descriptions.insert(record.id, record.description);
    }

    pub fn remove(&mut self, id: &str) -> Option<EntityRecord> {
        let name = self.names.remove(id)?;
        let description = self.descriptions.remove(id).unwrap_or_default();
        self.order.retain(|existing| existing != id);
        Some(EntityRecord {
            id: id.to_string(),
            name,
            description,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn description(&self, id: &str) -> Option<&str> {
        self.descriptions.get(id).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|id| self.names.get(id).map(|name| (id.as_str(), name.as_str())))
    }

    pub fn descriptions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().filter_map(|id| {
            self.descriptions
                .get(id)
                .map(|description| (id.as_str(), description.as_str()))
        })
    }

    pub fn id_to_name(&self) -> IdToName {
        IdToName::from_pairs(self.names())
    }
}

impl FromIterator<EntityRecord> for EntityTable {
    fn from_iter<I: IntoIterator<Item = EntityRecord>>(iter: I) -> Self {
        let mut table = Self::new();
        for record in iter {
            table.insert(record);
        }
        table
    }
}

/// Flat id→display-name table handed to task generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdToName(serde_json::Map<String, serde_json::Value>);

impl IdToName {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(id, name)| (id.to_string(), serde_json::Value::String(name.to_string())))
                .collect(),
        )
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let map: Self = read_json(path)?;
        if let Some((id, _)) = map.0.iter().find(|(_, value)| !value.is_string()) {
            return Err(AppError::Validation(format!(
                "id-to-name entry '{id}' in {} is not a string",
                path.display()
            )));
        }
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).and_then(serde_json::Value::as_str)
    }

    /// The entity's name, or the raw id when the table has no entry for it.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, name: &str, description: &str) -> EntityRecord {
        EntityRecord {
            id: id.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    #[test]
    fn reinsert_keeps_first_position() {
        let table: EntityTable = [
            record("id", "name", "RecipeInstructions"),
            record("Q1", "Sponge", "light"),
            record("Q2", "Parkin", "sticky"),
            record("Q1", "Victoria sponge", "jam"),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.ids().collect::<Vec<_>>(), vec!["id", "Q1", "Q2"]);
        assert_eq!(table.name("Q1"), Some("Victoria sponge"));
        assert_eq!(table.description("Q1"), Some("jam"));
    }

    #[test]
    fn remove_drops_from_both_mappings() {
        let mut table: EntityTable = [record("id", "name", "desc"), record("Q1", "Sponge", "light")]
            .into_iter()
            .collect();

        let removed = table.remove("id").unwrap();
        assert_eq!(removed.name, "name");
        assert!(table.remove("id").is_none());
        assert_eq!(table.names().collect::<Vec<_>>(), vec![("Q1", "Sponge")]);
        assert_eq!(table.descriptions().collect::<Vec<_>>(), vec![("Q1", "light")]);
    }

    #[test]
    fn id_to_name_preserves_order_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id_to_name.json");
        let table: EntityTable = [record("Q9", "Nut cake", ""), record("Q1", "Oat cake", "")]
            .into_iter()
            .collect();

        table.id_to_name().save(&path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"Q9":"Nut cake","Q1":"Oat cake"}"#);

        let loaded = IdToName::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.display_name("Q1"), "Oat cake");
        assert_eq!(loaded.display_name("Q404"), "Q404");
    }

    #[test]
    fn rejects_non_string_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("id_to_name.json");
        std::fs::write(&path, r#"{"Q1": 3}"#).unwrap();

        assert!(matches!(
            IdToName::load(&path),
            Err(AppError::Validation(_))
        ));
    }
}
