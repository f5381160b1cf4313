use crate::ValueMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unit of text handed between retrievers, readers and joiners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub meta: ValueMap,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            score: None,
            meta: ValueMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score {
            Some(score) => write!(f, "Document({}, score={}): {}", self.id, score, self.content),
            None => write!(f, "Document({}): {}", self.id, self.content),
        }
    }
}
