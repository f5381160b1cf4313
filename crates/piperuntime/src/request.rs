use pipecore::{Document, RunError, Value, ValueMap};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

const RUN_ARGUMENTS: [&str; 6] = ["query", "documents", "meta", "params", "debug", "debug_logs"];

/// Arguments of a single `Pipeline::run` call
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub query: String,
    pub documents: Option<Vec<Document>>,
    pub meta: Option<ValueMap>,
    /// Per-node keyword overrides, keyed by node name
    pub params: HashMap<String, ValueMap>,
    /// Run-level capture switch; overrides every node's own `debug` when set
    pub debug: Option<bool>,
    /// Run-level human-readable switch; overrides every node's own `debug_logs` when set
    pub debug_logs: Option<bool>,
    pub cancellation: CancellationToken,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_meta(mut self, meta: ValueMap) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Add one override for `node`
    pub fn with_param(
        mut self,
        node: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.params
            .entry(node.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, node: impl Into<String>, params: ValueMap) -> Self {
        self.params.entry(node.into()).or_default().extend(params);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_debug_logs(mut self, debug_logs: bool) -> Self {
        self.debug_logs = Some(debug_logs);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Build a request from loosely typed keyword arguments, rejecting
    /// unexpected keywords before reporting a missing `query`.
    pub fn from_args(mut args: ValueMap) -> Result<Self, RunError> {
        let mut unexpected: Vec<&String> = args
            .keys()
            .filter(|key| !RUN_ARGUMENTS.contains(&key.as_str()))
            .collect();
        unexpected.sort();
        if let Some(argument) = unexpected.first() {
            return Err(invalid(argument, "got an unexpected keyword argument"));
        }

        let query = match args.remove("query") {
            Some(Value::String(query)) => query,
            Some(_) => return Err(invalid("query", "expected a string for argument")),
            None => return Err(invalid("query", "missing 1 required argument:")),
        };
        let mut request = RunRequest::new(query);

        if let Some(documents) = args.remove("documents") {
            request.documents = Some(documents_arg(documents)?);
        }
        if let Some(meta) = args.remove("meta") {
            match meta {
                Value::Object(meta) => request.meta = Some(meta),
                _ => return Err(invalid("meta", "expected an object for argument")),
            }
        }
        if let Some(params) = args.remove("params") {
            request.params = params_arg(params)?;
        }
        if let Some(debug) = args.remove("debug") {
            request.debug = Some(bool_arg("debug", &debug)?);
        }
        if let Some(debug_logs) = args.remove("debug_logs") {
            request.debug_logs = Some(bool_arg("debug_logs", &debug_logs)?);
        }

        Ok(request)
    }

    /// Same as [`RunRequest::from_args`] for a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self, RunError> {
        match Value::from_json(json) {
            Value::Object(args) => Self::from_args(args),
            other => Err(invalid(other.type_name(), "expected keyword arguments as an object, got")),
        }
    }

    /// Values the root hands to its successors
    pub(crate) fn initial_values(&self) -> ValueMap {
        let mut values = ValueMap::new();
        values.insert("query".to_string(), Value::String(self.query.clone()));
        if let Some(documents) = &self.documents {
            values.insert("documents".to_string(), Value::Documents(documents.clone()));
        }
        if let Some(meta) = &self.meta {
            values.insert("meta".to_string(), Value::Object(meta.clone()));
        }
        values
    }
}

fn invalid(argument: &str, reason: &str) -> RunError {
    RunError::InvalidRunArgument {
        argument: argument.to_string(),
        reason: reason.to_string(),
    }
}

fn bool_arg(name: &str, value: &Value) -> Result<bool, RunError> {
    value
        .as_bool()
        .ok_or_else(|| invalid(name, "expected a boolean for argument"))
}

fn documents_arg(value: Value) -> Result<Vec<Document>, RunError> {
    match value {
        Value::Documents(documents) => Ok(documents),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => document_from_fields(fields),
                _ => Err(invalid("documents", "expected document objects in argument")),
            })
            .collect(),
        _ => Err(invalid("documents", "expected a list of documents for argument")),
    }
}

fn document_from_fields(mut fields: ValueMap) -> Result<Document, RunError> {
    let content = match fields.remove("content") {
        Some(Value::String(content)) => content,
        _ => return Err(invalid("documents", "expected a string 'content' in every entry of argument")),
    };
    let mut document = Document::new(content);
    match fields.remove("id") {
        Some(Value::String(id)) => document = document.with_id(id),
        Some(_) => return Err(invalid("documents", "expected a string 'id' in argument")),
        None => {}
    }
    match fields.remove("score") {
        Some(Value::Number(score)) => document = document.with_score(score),
        Some(Value::Null) | None => {}
        Some(_) => return Err(invalid("documents", "expected a numeric 'score' in argument")),
    }
    match fields.remove("meta") {
        Some(Value::Object(meta)) => document.meta = meta,
        Some(_) => return Err(invalid("documents", "expected an object 'meta' in argument")),
        None => {}
    }
    Ok(document)
}

fn params_arg(value: Value) -> Result<HashMap<String, ValueMap>, RunError> {
    let Value::Object(entries) = value else {
        return Err(invalid("params", "expected an object keyed by node name for argument"));
    };
    entries
        .into_iter()
        .map(|(node, params)| match params {
            Value::Object(params) => Ok((node, params)),
            _ => Err(invalid("params", "expected an object of overrides per node in argument")),
        })
        .collect()
}
