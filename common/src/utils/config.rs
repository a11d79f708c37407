use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::embedding::EmbeddingBackend;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_kb_dir")]
    pub kb_dir: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_entity_frequency")]
    pub entity_frequency: f32,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_sample_seed")]
    pub sample_seed: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            kb_dir: default_kb_dir(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: None,
            embedding_dimension: default_embedding_dimension(),
            entity_frequency: default_entity_frequency(),
            sample_size: default_sample_size(),
            sample_seed: default_sample_seed(),
        }
    }
}

impl AppConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_path().join(name)
    }

    pub fn kb_path(&self) -> PathBuf {
        self.data_path().join(&self.kb_dir)
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_kb_dir() -> String {
    "cake_kb".to_string()
}

// Width of the small English pipeline's document vectors.
fn default_embedding_dimension() -> usize {
    96
}

// Placeholder frequency; carries no corpus statistics.
fn default_entity_frequency() -> f32 {
    342.0
}

fn default_sample_size() -> usize {
    10
}

fn default_sample_seed() -> u64 {
    43
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::with_prefix("FOOD_LINKER"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_into_data_dir() {
        let config = AppConfig::default();
        assert_eq!(config.kb_path(), PathBuf::from("./data").join("cake_kb"));
        assert_eq!(
            config.data_file("id_to_name.json"),
            PathBuf::from("./data").join("id_to_name.json")
        );
        assert_eq!(config.sample_size, 10);
        assert_eq!(config.sample_seed, 43);
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashed);
    }

    #[test]
    fn empty_sources_deserialize_to_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .and_then(Config::try_deserialize)
            .expect("empty config should deserialize");
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.embedding_dimension, 96);
        assert!((config.entity_frequency - 342.0).abs() < f32::EPSILON);
    }
}
