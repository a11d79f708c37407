use std::collections::{HashMap, HashSet};

use common::storage::types::annotation_task::Token;
use tracing::debug;

use crate::tokens::tokenize;

/// Spans key the food detector writes under.
pub const SPANS_KEY: &str = "food-bert";
pub const FOOD_LABEL: &str = "FOOD";

/// A detected mention. `start`/`end` are token indices (end exclusive),
/// `start_char`/`end_char` character offsets into the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSpan {
    pub start: usize,
    pub end: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Doc {
    pub text: String,
    pub tokens: Vec<Token>,
    spans: HashMap<String, Vec<DetectedSpan>>,
}

impl Doc {
    pub fn spans(&self, key: &str) -> &[DetectedSpan] {
        self.spans.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

pub trait SpanDetector {
    fn detect(&self, text: &str, tokens: &[Token]) -> Vec<DetectedSpan>;
}

/// Dictionary-driven span detector.
///
/// Terms are tokenised like the documents and matched case-insensitively on
/// whole tokens. At each position the longest term wins; matches never
/// overlap.
#[derive(Debug, Clone)]
pub struct GazetteerDetector {
    label: String,
    patterns: HashSet<Vec<String>>,
    max_len: usize,
}

impl GazetteerDetector {
    pub fn new<I, S>(label: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: HashSet<Vec<String>> = terms
            .into_iter()
            .map(|term| {
                tokenize(term.as_ref())
                    .into_iter()
                    .map(|token| token.text.to_lowercase())
                    .collect::<Vec<_>>()
            })
            .filter(|pattern| !pattern.is_empty())
            .collect();
        let max_len = patterns.iter().map(Vec::len).max().unwrap_or(0);

        Self {
            label: label.into(),
            patterns,
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl SpanDetector for GazetteerDetector {
    fn detect(&self, text: &str, tokens: &[Token]) -> Vec<DetectedSpan> {
        let lowered: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let mut spans = Vec::new();
        let mut pos = 0usize;

        while pos < lowered.len() {
            let longest = (1..=self.max_len.min(lowered.len() - pos))
                .rev()
                .find(|len| {
                    lowered
                        .get(pos..pos + len)
                        .is_some_and(|window| self.patterns.contains(window))
                });

            let (Some(len), Some(first)) = (longest, tokens.get(pos)) else {
                pos += 1;
                continue;
            };
            let Some(last) = tokens.get(pos + len - 1) else {
                break;
            };

            spans.push(DetectedSpan {
                start: pos,
                end: pos + len,
                start_char: first.start,
                end_char: last.end,
                text: text
                    .chars()
                    .skip(first.start)
                    .take(last.end - first.start)
                    .collect(),
                label: self.label.clone(),
            });
            pos += len;
        }

        spans
    }
}

/// A blank pipeline: the tokenizer followed by named span detectors.
#[derive(Default)]
pub struct Pipeline {
    components: Vec<(String, Box<dyn SpanDetector>)>,
}

impl Pipeline {
    pub fn blank() -> Self {
        Self::default()
    }

    /// Appends a detector whose spans are stored under `spans_key`.
    pub fn add_pipe(
        &mut self,
        spans_key: impl Into<String>,
        detector: impl SpanDetector + 'static,
    ) {
        self.components.push((spans_key.into(), Box::new(detector)));
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(key, _)| key.as_str())
    }

    pub fn process(&self, text: &str) -> Doc {
        let tokens = tokenize(text);
        let mut spans = HashMap::new();
        for (key, detector) in &self.components {
            let found = detector.detect(text, &tokens);
            debug!(component = %key, spans = found.len(), "Ran span detector");
            spans
                .entry(key.clone())
                .or_insert_with(Vec::new)
                .extend(found);
        }

        Doc {
            text: text.to_string(),
            tokens,
            spans,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food_pipeline(terms: &[&str]) -> Pipeline {
        let mut pipeline = Pipeline::blank();
        pipeline.add_pipe(SPANS_KEY, GazetteerDetector::new(FOOD_LABEL, terms));
        pipeline
    }

    #[test]
    fn finds_single_token_term() {
        let doc = food_pipeline(&["cake"]).process("a rich cake");
        let spans = doc.spans(SPANS_KEY);

        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0],
            DetectedSpan {
                start: 2,
                end: 3,
                start_char: 7,
                end_char: 11,
                text: "cake".into(),
                label: FOOD_LABEL.into(),
            }
        );
    }

    #[test]
    fn prefers_longest_match_and_keeps_original_casing() {
        let doc = food_pipeline(&["cake", "-cake", "toasted oat-cake"])
            .process("Some Toasted oat-cake and a cake.");
        let texts: Vec<&str> = doc.spans(SPANS_KEY).iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Toasted oat-cake", "cake"]);
        assert_eq!(doc.spans(SPANS_KEY)[0].end - doc.spans(SPANS_KEY)[0].start, 4);
    }

    #[test]
    fn does_not_match_inside_words() {
        let doc = food_pipeline(&["cake"]).process("cupcakes and pancakes");
        assert!(doc.spans(SPANS_KEY).is_empty());
    }

    #[test]
    fn unknown_key_has_no_spans() {
        let doc = food_pipeline(&["cake"]).process("cake");
        assert!(doc.spans("ents").is_empty());
        assert_eq!(doc.tokens.len(), 1);
    }

    #[test]
    fn blank_terms_are_ignored() {
        let detector = GazetteerDetector::new(FOOD_LABEL, ["", "  ", "nut cakes"]);
        assert_eq!(detector.len(), 1);
    }

    #[test]
    fn components_are_listed_in_order() {
        let mut pipeline = food_pipeline(&["cake"]);
        pipeline.add_pipe("tarts", GazetteerDetector::new(FOOD_LABEL, ["tart"]));

        let doc = pipeline.process("cake and tart");
        assert_eq!(doc.spans(SPANS_KEY).len(), 1);
        assert_eq!(doc.spans("tarts")[0].text, "tart");
        assert_eq!(
            pipeline.component_names().collect::<Vec<_>>(),
            vec![SPANS_KEY, "tarts"]
        );
    }
}
