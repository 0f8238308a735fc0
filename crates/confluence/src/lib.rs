pub mod engine;
pub mod merge;

pub use engine::ConfluenceEngine;
pub use merge::{merge_symbol, ConfluenceOutcome};
