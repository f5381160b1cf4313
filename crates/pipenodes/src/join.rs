use async_trait::async_trait;
use pipecore::{Document, Node, NodeContext, NodeError, NodeOutput, Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Keep every document once, in input order
    Concatenate,
    /// Sum weighted scores per document id and rank by the result
    Merge,
}

/// Combines the documents of several retrievers into one list
pub struct JoinDocuments {
    join_mode: JoinMode,
    weights: Option<Vec<f64>>,
    top_k_join: Option<usize>,
}

impl JoinDocuments {
    pub fn new(join_mode: JoinMode) -> Self {
        Self {
            join_mode,
            weights: None,
            top_k_join: None,
        }
    }

    /// One weight per declared input of the join, in declaration order
    /// (merge mode only). Inputs that were not live in a run are ignored.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_top_k(mut self, top_k_join: usize) -> Self {
        self.top_k_join = Some(top_k_join);
        self
    }

    fn concatenate(inputs: Vec<Vec<Document>>) -> Vec<Document> {
        let mut seen = std::collections::HashSet::new();
        inputs
            .into_iter()
            .flatten()
            .filter(|doc| seen.insert(doc.id.clone()))
            .collect()
    }

    fn merge(&self, inputs: Vec<(usize, Vec<Document>)>) -> Result<Vec<Document>, NodeError> {
        let weights = match &self.weights {
            Some(weights) => inputs
                .iter()
                .map(|(slot, _)| {
                    weights.get(*slot).copied().ok_or_else(|| {
                        NodeError::Configuration(format!(
                            "no weight for joined input {} ({} weights given)",
                            slot + 1,
                            weights.len()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![1.0 / inputs.len() as f64; inputs.len()],
        };

        let mut order: Vec<Document> = Vec::new();
        let mut scores: HashMap<String, f64> = HashMap::new();
        for ((_, docs), weight) in inputs.into_iter().zip(weights) {
            for doc in docs {
                let score = doc.score.unwrap_or(0.0) * weight;
                match scores.get_mut(&doc.id) {
                    Some(total) => *total += score,
                    None => {
                        scores.insert(doc.id.clone(), score);
                        order.push(doc);
                    }
                }
            }
        }

        for doc in &mut order {
            doc.score = scores.get(&doc.id).copied();
        }
        order.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
        });
        Ok(order)
    }
}

fn documents_of(values: &ValueMap) -> Result<Vec<Document>, NodeError> {
    match values.get("documents") {
        Some(Value::Documents(docs)) => Ok(docs.clone()),
        Some(other) => Err(NodeError::InvalidInputType {
            field: "documents".to_string(),
            expected: "documents".to_string(),
            actual: other.type_name().to_string(),
        }),
        None => Err(NodeError::MissingInput("documents".to_string())),
    }
}

#[async_trait]
impl Node for JoinDocuments {
    fn node_type(&self) -> &str {
        "join.documents"
    }

    fn parameters(&self) -> &[&'static str] {
        &["top_k_join"]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let (mut documents, query) = match ctx.joined_inputs() {
            Some(joined) => {
                let docs = ctx
                    .joined_slots()
                    .into_iter()
                    .zip(&joined)
                    .map(|(slot, values)| documents_of(values).map(|docs| (slot, docs)))
                    .collect::<Result<Vec<_>, _>>()?;
                let query = joined.iter().find_map(|values| values.get("query")).cloned();
                let documents = match self.join_mode {
                    JoinMode::Concatenate => {
                        Self::concatenate(docs.into_iter().map(|(_, docs)| docs).collect())
                    }
                    JoinMode::Merge => self.merge(docs)?,
                };
                (documents, query)
            }
            // Only one branch was live in this run: nothing to combine
            None => (documents_of(&ctx.inputs)?, ctx.inputs.get("query").cloned()),
        };

        let top_k = match ctx.params.get("top_k_join") {
            Some(value) => Some(value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
                field: "top_k_join".to_string(),
                expected: "number".to_string(),
                actual: value.type_name().to_string(),
            })? as usize),
            None => self.top_k_join,
        };
        if let Some(top_k) = top_k {
            documents.truncate(top_k);
        }

        tracing::debug!("Joined {} documents ({:?})", documents.len(), self.join_mode);

        let mut output = NodeOutput::new().with_output("documents", documents);
        if let Some(query) = query {
            output = output.with_output("query", query);
        }
        Ok(output)
    }
}
