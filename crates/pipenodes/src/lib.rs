//! Standard node library
//!
//! Reusable nodes built on the pipeline node contract

mod classifier;
mod debug;
mod join;
mod time;

pub use classifier::KeywordQuestionClassifier;
pub use debug::DebugNode;
pub use join::{JoinDocuments, JoinMode};
pub use time::DelayNode;
