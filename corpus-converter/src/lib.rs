use std::{fs, path::Path};

use common::{error::AppError, storage::jsonl::JsonlWriter};
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

/// Raw corpus column holding the sentence text.
pub const SOURCE_TEXT_COLUMN: &str = "sentences";
pub const TEXT_COLUMN: &str = "text";
pub const RECIPE_COLUMNS: [&str; 3] = ["id", "name", "RecipeInstructions"];

#[derive(Debug, Clone)]
pub struct ConvertSettings {
    pub text_column: String,
    pub renamed_text_column: String,
    pub keywords: Vec<String>,
    pub drop_columns: Vec<String>,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            text_column: SOURCE_TEXT_COLUMN.to_string(),
            renamed_text_column: TEXT_COLUMN.to_string(),
            keywords: vec!["cake".to_string(), "cakes".to_string()],
            drop_columns: vec!["label".to_string(), "index".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSummary {
    pub rows_read: usize,
    pub rows_written: usize,
}

#[derive(Debug, Clone)]
pub struct SampleSettings {
    pub columns: Vec<String>,
    pub size: usize,
    pub seed: u64,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            columns: RECIPE_COLUMNS.iter().map(ToString::to_string).collect(),
            size: 10,
            seed: 43,
        }
    }
}

/// Headers a dataframe export gives its row index: blank or `Unnamed: N`.
pub fn is_index_column(header: &str) -> bool {
    let header = header.trim();
    header.is_empty() || header.starts_with("Unnamed:")
}

/// Case-insensitive substring match against any keyword.
pub fn matches_keywords(text: &str, keywords: &[String]) -> bool {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .any(|keyword| lowered.contains(&keyword.to_lowercase()))
}

/// Types a CSV cell the way a dataframe export would: empty cells become
/// `null`, numeric cells become numbers, everything else stays a string.
pub fn infer_json_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(raw.to_string())
}

/// Filters the raw corpus down to keyword-bearing rows and writes them as
/// JSON lines with the text column renamed.
pub fn convert_training_data(
    input: &Path,
    output: &Path,
    settings: &ConvertSettings,
) -> Result<ConversionSummary, AppError> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();

    let text_index = headers
        .iter()
        .position(|header| header == settings.text_column)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "column '{}' missing from {}",
                settings.text_column,
                input.display()
            ))
        })?;

    // (source index, output key) for every column that survives.
    let kept: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, header)| {
            *idx == text_index
                || !(is_index_column(header)
                    || settings
                        .drop_columns
                        .iter()
                        .any(|drop| drop.as_str() == *header))
        })
        .map(|(idx, header)| {
            let key = if idx == text_index {
                settings.renamed_text_column.clone()
            } else {
                header.to_string()
            };
            (idx, key)
        })
        .collect();

    let mut writer = JsonlWriter::create(output)?;
    let mut rows_read = 0usize;

    for record in reader.records() {
        let record = record?;
        rows_read += 1;

        let text = record.get(text_index).unwrap_or_default();
        if !matches_keywords(text, &settings.keywords) {
            continue;
        }

        let mut row = Map::new();
        for (idx, key) in &kept {
            let cell = record.get(*idx).unwrap_or_default();
            let value = if *idx == text_index {
                Value::String(cell.to_string())
            } else {
                infer_json_value(cell)
            };
            row.insert(key.clone(), value);
        }
        writer.write(&row)?;
    }

    let rows_written = writer.finish()?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows_read,
        rows_written,
        "Converted training corpus to JSONL"
    );

    Ok(ConversionSummary {
        rows_read,
        rows_written,
    })
}

/// Projects the recipe columns and writes a seeded random sample of rows.
pub fn sample_recipes(
    input: &Path,
    output: &Path,
    settings: &SampleSettings,
) -> Result<usize, AppError> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();

    let positions = settings
        .columns
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|header| header == column.as_str())
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "column '{column}' missing from {}",
                        input.display()
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let projected: Vec<String> = positions
            .iter()
            .map(|&idx| record.get(idx).unwrap_or_default().to_string())
            .collect();
        rows.push(projected);
    }

    if rows.len() < settings.size {
        return Err(AppError::Validation(format!(
            "cannot sample {} rows from {} which only has {}",
            settings.size,
            input.display(),
            rows.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let picked = index::sample(&mut rng, rows.len(), settings.size);
    debug!(indices = ?picked.clone().into_vec(), "Sampled recipe rows");

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(&settings.columns)?;
    for idx in picked {
        if let Some(row) = rows.get(idx) {
            writer.write_record(row)?;
        }
    }
    writer.flush()?;

    info!(
        input = %input.display(),
        output = %output.display(),
        population = rows.len(),
        sample = settings.size,
        seed = settings.seed,
        "Sampled recipes"
    );

    Ok(settings.size)
}
