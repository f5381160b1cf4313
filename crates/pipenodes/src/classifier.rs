use async_trait::async_trait;
use pipecore::{Node, NodeContext, NodeError, NodeOutput, Route};

const QUESTION_WORDS: &[&str] = &[
    "what", "who", "whom", "whose", "where", "when", "why", "how", "which", "is", "are", "was",
    "were", "do", "does", "did", "can", "could", "should", "would", "will", "shall", "has", "have",
    "had", "may", "might",
];

/// Routes questions to `output_1` and keyword queries to `output_2`,
/// passing its inputs through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordQuestionClassifier;

impl KeywordQuestionClassifier {
    pub fn is_question(query: &str) -> bool {
        let query = query.trim();
        if query.ends_with('?') {
            return true;
        }
        query
            .split_whitespace()
            .next()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .is_some_and(|word| QUESTION_WORDS.contains(&word.as_str()))
    }
}

#[async_trait]
impl Node for KeywordQuestionClassifier {
    fn node_type(&self) -> &str {
        "classifier.keyword_question"
    }

    fn outgoing_edges(&self) -> usize {
        2
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_input("query")?;
        let query = value.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "query".to_string(),
            expected: "string".to_string(),
            actual: value.type_name().to_string(),
        })?;

        let route = if Self::is_question(query) {
            Route::Output(1)
        } else {
            Route::Output(2)
        };
        tracing::debug!("Classified '{}' as {}", query, route);

        Ok(NodeOutput::from_values(ctx.inputs).with_route(route))
    }
}
