//! Core abstractions for the pipeline engine
//!
//! This crate provides the node contract, the dynamic value model, the
//! error taxonomy and execution events. It does no scheduling of its own.

mod document;
mod error;
pub mod events;
mod node;
mod value;

pub use document::Document;
pub use error::{GraphError, NodeError, PipelineError, RunError};
pub use events::*;
pub use node::{Node, NodeContext, NodeOutput, Route, DEBUG_KEY, JOIN_INPUTS};
pub use value::{Value, ValueMap};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
