pub mod pipeline;
pub mod recipe;
pub mod tasks;
pub mod tokens;

pub use pipeline::{Doc, GazetteerDetector, Pipeline, SpanDetector, FOOD_LABEL, SPANS_KEY};
pub use recipe::{
    entity_linker_manual, load_terms, read_stream, RecipeArgs, RecipeComponents, RecipeConfig,
    RECIPE_NAME,
};
pub use tasks::{make_tasks, TaskStream};
pub use tokens::{add_tokens, tokenize};
