use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

pub const NIL_OTHER_LINK: &str = "NIL_otherLink";
pub const NIL_AMBIGUOUS: &str = "NIL_ambiguous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub id: usize,
    pub ws: bool,
}

/// A predicted entity mention. Offsets are in characters; `token_end` is
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanAnnotation {
    pub token_start: usize,
    pub token_end: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOption {
    pub id: String,
    pub text: String,
}

impl TaskOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn other_link() -> Self {
        Self::new(NIL_OTHER_LINK, "Not in options")
    }

    pub fn ambiguous() -> Self {
        Self::new(NIL_AMBIGUOUS, "Need more context")
    }
}

/// One record of the annotation stream.
///
/// Any JSON object with a string `text` is accepted. Keys other than the
/// ones modelled here are carried through untouched in `meta`; incoming
/// `spans` are discarded, and `tokens`/`options` are kept only when they
/// have the shape the annotation views read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct AnnotationTask {
    pub text: String,
    pub tokens: Vec<Token>,
    pub spans: Vec<SpanAnnotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<TaskOption>>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl AnnotationTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: Vec::new(),
            spans: Vec::new(),
            options: None,
            meta: Map::new(),
        }
    }
}

impl TryFrom<Map<String, Value>> for AnnotationTask {
    type Error = AppError;

    fn try_from(mut record: Map<String, Value>) -> Result<Self, Self::Error> {
        let text = match record.remove("text") {
            Some(Value::String(text)) => text,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "`text` must be a string, found {other}"
                )))
            }
            None => return Err(AppError::Validation("record has no `text` field".into())),
        };

        let tokens = record
            .remove("tokens")
            .and_then(|value| serde_json::from_value::<Vec<Token>>(value).ok())
            .unwrap_or_default();
        let options = record
            .remove("options")
            .and_then(|value| serde_json::from_value::<Vec<TaskOption>>(value).ok());
        // Predicted spans are always recomputed.
        record.remove("spans");

        Ok(Self {
            text,
            tokens,
            spans: Vec::new(),
            options,
            meta: record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_unknown_keys_and_omits_missing_options() {
        let task: AnnotationTask =
            serde_json::from_value(json!({"text": "a rich cake", "source": "novel", "year": 1861}))
                .unwrap();
        assert_eq!(task.meta.get("source"), Some(&json!("novel")));
        assert!(task.spans.is_empty());

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["year"], json!(1861));
        assert_eq!(value["spans"], json!([]));
        assert!(value.get("options").is_none());
        assert_eq!(value["tokens"], json!([]));
    }

    #[test]
    fn foreign_annotation_keys_do_not_reject_the_record() {
        let task: AnnotationTask = serde_json::from_value(json!({
            "text": "a rich cake",
            "spans": [{"start": 2, "end": 6, "label": "FOOD"}],
            "tokens": null,
            "options": 3,
            "_input_hash": 17
        }))
        .unwrap();

        assert_eq!(task.text, "a rich cake");
        assert!(task.spans.is_empty());
        assert!(task.tokens.is_empty());
        assert!(task.options.is_none());
        assert_eq!(task.meta.get("_input_hash"), Some(&json!(17)));
        assert!(!task.meta.contains_key("spans"));
    }

    #[test]
    fn well_formed_tokens_and_options_are_kept() {
        let task: AnnotationTask = serde_json::from_value(json!({
            "text": "cake",
            "tokens": [{"text": "cake", "start": 0, "end": 4, "id": 0, "ws": false}],
            "options": [{"id": "Q1", "text": "Parkin"}]
        }))
        .unwrap();

        assert_eq!(task.tokens.len(), 1);
        assert_eq!(task.options, Some(vec![TaskOption::new("Q1", "Parkin")]));
    }

    #[test]
    fn blank_text_still_serializes_tokens() {
        let value = serde_json::to_value(AnnotationTask::new("   ")).unwrap();
        assert_eq!(value["tokens"], json!([]));
        assert_eq!(value["spans"], json!([]));
    }

    #[test]
    fn record_without_text_is_rejected() {
        let result = serde_json::from_value::<AnnotationTask>(json!({"sentence": "cake"}));
        assert!(result.is_err());
        let result = serde_json::from_value::<AnnotationTask>(json!({"text": 7}));
        assert!(result.is_err());
    }

    #[test]
    fn sentinel_options() {
        assert_eq!(TaskOption::other_link().id, NIL_OTHER_LINK);
        assert_eq!(TaskOption::ambiguous().text, "Need more context");
    }
}
