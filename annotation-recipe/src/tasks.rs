use common::{
    error::AppError,
    storage::types::{
        annotation_task::{AnnotationTask, SpanAnnotation, TaskOption},
        entity::IdToName,
        knowledge_base::{Candidate, KnowledgeBase},
    },
};
use tracing::debug;

use crate::pipeline::{DetectedSpan, Doc, Pipeline, SPANS_KEY};

type TaskResult = Result<AnnotationTask, AppError>;

fn span_annotation(span: &DetectedSpan) -> SpanAnnotation {
    SpanAnnotation {
        token_start: span.start,
        token_end: span.end.saturating_sub(1),
        start: span.start_char,
        end: span.end_char,
        text: span.text.clone(),
        label: span.label.clone(),
    }
}

/// Choice options for a span's candidates followed by the two fixed escape
/// choices.
pub fn candidate_options(candidates: &[Candidate<'_>], id2name: &IdToName) -> Vec<TaskOption> {
    candidates
        .iter()
        .map(|candidate| {
            TaskOption::new(candidate.entity, id2name.display_name(candidate.entity))
        })
        .chain([TaskOption::other_link(), TaskOption::ambiguous()])
        .collect()
}

/// Attaches the doc's predicted spans and, when the knowledge base knows a
/// span, its candidate options. With several linkable spans the options of
/// the last one are kept.
pub fn annotate(
    doc: &Doc,
    mut task: AnnotationTask,
    kb: &KnowledgeBase,
    id2name: &IdToName,
) -> AnnotationTask {
    let spans = doc.spans(SPANS_KEY);
    let mut ent_labels = Vec::with_capacity(spans.len());

    for span in spans {
        ent_labels.push(span_annotation(span));

        let candidates = kb.get_candidates(&span.text);
        if !candidates.is_empty() {
            debug!(
                span = %span.text,
                candidates = candidates.len(),
                "Linked span to knowledge base"
            );
            task.options = Some(candidate_options(&candidates, id2name));
        }
    }

    task.spans = ent_labels;
    task
}

// Runs the pipeline over one record and attaches spans and options.
fn link_record(
    pipeline: &Pipeline,
    kb: &KnowledgeBase,
    id2name: &IdToName,
    item: TaskResult,
) -> TaskResult {
    let task = item?;
    let doc = pipeline.process(&task.text);
    Ok(annotate(&doc, task, kb, id2name))
}

/// Adds predicted entities and candidate entities to the stream.
pub fn make_tasks<'a, I>(
    pipeline: &'a Pipeline,
    kb: &'a KnowledgeBase,
    stream: I,
    id2name: &'a IdToName,
) -> impl Iterator<Item = TaskResult> + 'a
where
    I: IntoIterator<Item = TaskResult>,
    I::IntoIter: 'a,
{
    stream
        .into_iter()
        .map(move |item| link_record(pipeline, kb, id2name, item))
}

/// Owning counterpart of [`make_tasks`], handed to the annotation tool.
pub struct TaskStream {
    pipeline: Pipeline,
    kb: KnowledgeBase,
    id2name: IdToName,
    source: Box<dyn Iterator<Item = TaskResult>>,
}

impl TaskStream {
    pub fn new(
        pipeline: Pipeline,
        kb: KnowledgeBase,
        id2name: IdToName,
        source: impl Iterator<Item = TaskResult> + 'static,
    ) -> Self {
        Self {
            pipeline,
            kb,
            id2name,
            source: Box::new(source),
        }
    }
}

impl Iterator for TaskStream {
    type Item = TaskResult;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.source.next()?;
        Some(link_record(&self.pipeline, &self.kb, &self.id2name, item))
    }
}
