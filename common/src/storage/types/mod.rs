pub mod annotation_task;
pub mod entity;
pub mod knowledge_base;
