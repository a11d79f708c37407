pub mod jsonl;
pub mod store;
pub mod types;
