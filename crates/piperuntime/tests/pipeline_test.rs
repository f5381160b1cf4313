// crates/piperuntime/tests/pipeline_test.rs

use async_trait::async_trait;
use pipecore::{
    ExecutionEvent, Node, NodeContext, NodeError, NodeOutput, PipelineError, Route, RunError,
    Value, ValueMap, DEBUG_KEY,
};
use piperuntime::{InMemoryMetrics, Pipeline, RunRequest, RuntimeConfig};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Starts a chain: ignores its input and emits `letter` under `key`
struct Start {
    key: &'static str,
    letter: &'static str,
    route: Route,
    edges: usize,
}

impl Start {
    fn new(key: &'static str) -> Arc<dyn Node> {
        Arc::new(Self {
            key,
            letter: "A",
            route: Route::Output(1),
            edges: 1,
        })
    }

    fn branching(key: &'static str, route: Route) -> Arc<dyn Node> {
        Arc::new(Self {
            key,
            letter: "A",
            route,
            edges: 2,
        })
    }
}

#[async_trait]
impl Node for Start {
    fn node_type(&self) -> &str {
        "test.start"
    }

    fn outgoing_edges(&self) -> usize {
        self.edges
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new()
            .with_output(self.key, self.letter)
            .with_route(self.route))
    }
}

/// Appends `letter` to the string under `key`
struct Append {
    key: &'static str,
    letter: &'static str,
    delay_ms: u64,
}

fn append(key: &'static str, letter: &'static str) -> Arc<dyn Node> {
    Arc::new(Append {
        key,
        letter,
        delay_ms: 0,
    })
}

fn slow_append(key: &'static str, letter: &'static str, delay_ms: u64) -> Arc<dyn Node> {
    Arc::new(Append {
        key,
        letter,
        delay_ms,
    })
}

#[async_trait]
impl Node for Append {
    fn node_type(&self) -> &str {
        "test.append"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        let current = ctx
            .require_input(self.key)?
            .as_str()
            .ok_or_else(|| NodeError::MissingInput(self.key.to_string()))?;
        Ok(NodeOutput::new().with_output(self.key, format!("{}{}", current, self.letter)))
    }
}

/// Concatenates `key` across joined inputs, or passes a single input through
struct Concat {
    key: &'static str,
}

fn concat(key: &'static str) -> Arc<dyn Node> {
    Arc::new(Concat { key })
}

#[async_trait]
impl Node for Concat {
    fn node_type(&self) -> &str {
        "test.concat"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let joined = match ctx.joined_inputs() {
            Some(inputs) => inputs
                .iter()
                .filter_map(|input| input.get(self.key).and_then(Value::as_str))
                .collect::<String>(),
            None => ctx
                .require_input(self.key)?
                .as_str()
                .unwrap_or_default()
                .to_string(),
        };
        Ok(NodeOutput::new().with_output(self.key, joined))
    }
}

/// Passes inputs through and accepts `top_k`
struct Retriever;

#[async_trait]
impl Node for Retriever {
    fn node_type(&self) -> &str {
        "test.retriever"
    }

    fn parameters(&self) -> &[&'static str] {
        &["top_k"]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let top_k = ctx.param_or("top_k", Value::Number(10.0));
        Ok(NodeOutput::from_values(ctx.inputs).with_output("top_k", top_k))
    }
}

fn run_output(result: &ValueMap, key: &str) -> String {
    result[key].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_parallel_paths_join_in_declaration_order() {
    init_tracing();

    let mut pipeline = Pipeline::new();
    pipeline.add_node("A", Start::new("test"), ["Query"]).unwrap();
    pipeline.add_node("B", append("test", "B"), ["A"]).unwrap();
    pipeline.add_node("C", append("test", "C"), ["B"]).unwrap();
    pipeline.add_node("E", append("test", "E"), ["C"]).unwrap();
    pipeline.add_node("D", append("test", "D"), ["B"]).unwrap();
    pipeline.add_node("F", concat("test"), ["D", "E"]).unwrap();

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(run_output(&output, "test"), "ABDABCE");

    let mut pipeline = Pipeline::new();
    pipeline.add_node("A", Start::new("test"), ["Query"]).unwrap();
    pipeline.add_node("B", append("test", "B"), ["A"]).unwrap();
    pipeline.add_node("C", append("test", "C"), ["B"]).unwrap();
    pipeline.add_node("D", append("test", "D"), ["B"]).unwrap();
    pipeline.add_node("E", concat("test"), ["C", "D"]).unwrap();

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(run_output(&output, "test"), "ABCABD");
}

fn branching_pipeline(route: Route, metrics: Arc<InMemoryMetrics>) -> Pipeline {
    let mut pipeline = Pipeline::new().with_metrics(metrics);
    pipeline.add_node("A", Start::branching("output", route), ["Query"]).unwrap();
    pipeline.add_node("B", append("output", "B"), ["A.output_1"]).unwrap();
    pipeline.add_node("C", append("output", "C"), ["A.output_2"]).unwrap();
    pipeline.add_node("D", append("output", "E"), ["B"]).unwrap();
    pipeline.add_node("E", append("output", "D"), ["B"]).unwrap();
    pipeline.add_node("F", concat("output"), ["D", "E", "C"]).unwrap();
    pipeline
}

#[tokio::test]
async fn test_branching_output_1_skips_output_2_branch() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = branching_pipeline(Route::Output(1), metrics.clone());

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(run_output(&output, "output"), "ABEABD");

    assert!(metrics.node("C").is_none(), "C depends only on output_2");
    for name in ["A", "B", "D", "E", "F"] {
        assert_eq!(metrics.node(name).unwrap().invocations, 1, "{} ran once", name);
    }
}

#[tokio::test]
async fn test_branching_output_2_skips_whole_output_1_subtree() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = branching_pipeline(Route::Output(2), metrics.clone());

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    // Only C reaches the join, so its value is merged directly
    assert_eq!(run_output(&output, "output"), "AC");

    for name in ["B", "D", "E"] {
        assert!(metrics.node(name).is_none(), "{} must not run", name);
    }
    assert_eq!(metrics.node("F").unwrap().invocations, 1);
}

#[tokio::test]
async fn test_branching_output_all_feeds_every_edge() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = branching_pipeline(Route::All, metrics.clone());

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    // Join order is D, E, C as declared
    assert_eq!(run_output(&output, "output"), "ABEABDAC");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.nodes.len(), 6);
    assert!(snapshot.nodes.values().all(|stats| stats.invocations == 1));
    assert_eq!(snapshot.runs, 1);
}

#[tokio::test]
async fn test_join_with_partially_unreachable_nested_branches() {
    // Two classifiers route independently; the join only waits for live edges
    let mut pipeline = Pipeline::new();
    pipeline.add_node("Outer", Start::branching("v", Route::Output(1)), ["Query"]).unwrap();
    pipeline.add_node("Inner", Arc::new(InnerClassifier), ["Outer.output_1"]).unwrap();
    pipeline.add_node("X", append("v", "X"), ["Inner.output_1"]).unwrap();
    pipeline.add_node("Y", append("v", "Y"), ["Inner.output_2"]).unwrap();
    pipeline.add_node("Z", append("v", "Z"), ["Outer.output_2"]).unwrap();
    pipeline.add_node("Join", concat("v"), ["X", "Y", "Z"]).unwrap();

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(run_output(&output, "v"), "AIY");
}

/// Always picks its second route
struct InnerClassifier;

#[async_trait]
impl Node for InnerClassifier {
    fn node_type(&self) -> &str {
        "test.inner"
    }

    fn outgoing_edges(&self) -> usize {
        2
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let v = ctx.require_input("v")?.as_str().unwrap_or_default();
        Ok(NodeOutput::new()
            .with_output("v", format!("{}I", v))
            .with_route(Route::Output(2)))
    }
}

#[tokio::test]
async fn test_fully_unreachable_join_is_skipped_and_branch_is_terminal() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let mut pipeline = Pipeline::new().with_metrics(metrics.clone());
    pipeline.add_node("A", Start::branching("v", Route::Output(2)), ["Query"]).unwrap();
    pipeline.add_node("B", append("v", "B"), ["A.output_1"]).unwrap();
    pipeline.add_node("C", append("v", "C"), ["A.output_1"]).unwrap();
    pipeline.add_node("Join", concat("v"), ["B", "C"]).unwrap();

    let mut events = pipeline.subscribe_events();
    let output = pipeline.run(RunRequest::new("test")).await.unwrap();

    // A chose a route with no successors, so its own output is the result
    assert_eq!(run_output(&output, "v"), "A");
    assert!(metrics.node("Join").is_none());

    let mut skipped = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeSkipped { node, .. } = event {
            skipped.push(node);
        }
    }
    skipped.sort();
    assert_eq!(skipped, vec!["B", "C", "Join"]);
}

/// Mutates the shared list it receives
struct PushItem {
    item: &'static str,
}

#[async_trait]
impl Node for PushItem {
    fn node_type(&self) -> &str {
        "test.push"
    }

    async fn execute(&self, mut ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if let Some(Value::Array(items)) = ctx.inputs.get_mut("items") {
            items.push(Value::from(self.item));
        }
        Ok(NodeOutput::from_values(ctx.inputs))
    }
}

/// Emits a one-element list on every edge
struct Seed;

#[async_trait]
impl Node for Seed {
    fn node_type(&self) -> &str {
        "test.seed"
    }

    fn outgoing_edges(&self) -> usize {
        2
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new()
            .with_output("items", Value::Array(vec![Value::from("seed")]))
            .with_route(Route::All))
    }
}

#[tokio::test]
async fn test_sibling_branches_never_share_values() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("Seed", Arc::new(Seed), ["Query"]).unwrap();
    pipeline.add_node("Left", Arc::new(PushItem { item: "left" }), ["Seed.output_1"]).unwrap();
    pipeline.add_node("Right", Arc::new(PushItem { item: "right" }), ["Seed.output_2"]).unwrap();
    pipeline.add_node("Tail", Arc::new(PushItem { item: "tail" }), ["Seed.output_1"]).unwrap();
    pipeline.add_node("Join", Arc::new(PassJoin), ["Left", "Right", "Tail"]).unwrap();

    let output = pipeline.run(RunRequest::new("q")).await.unwrap();
    let inputs = output["inputs"].as_array().unwrap();
    let lists: Vec<Vec<String>> = inputs
        .iter()
        .map(|input| {
            input.as_object().unwrap()["items"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect()
        })
        .collect();

    assert_eq!(
        lists,
        vec![
            vec!["seed".to_string(), "left".to_string()],
            vec!["seed".to_string(), "right".to_string()],
            vec!["seed".to_string(), "tail".to_string()],
        ]
    );
}

/// Returns whatever it was called with
struct PassJoin;

#[async_trait]
impl Node for PassJoin {
    fn node_type(&self) -> &str {
        "test.pass_join"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::from_values(ctx.inputs))
    }
}

fn retriever_reader() -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("ESRetriever", Arc::new(Retriever), ["Query"]).unwrap();
    pipeline.add_node("Reader", Arc::new(Retriever), ["ESRetriever"]).unwrap();
    pipeline
}

fn debug_entry<'a>(output: &'a ValueMap, node: &str) -> Option<&'a ValueMap> {
    output.get(DEBUG_KEY)?.as_object()?.get(node)?.as_object()
}

#[tokio::test]
async fn test_debug_attributes_global() {
    let pipeline = retriever_reader();
    let output = pipeline
        .run(
            RunRequest::new("Who lives in Berlin?")
                .with_param("ESRetriever", "top_k", 10i64)
                .with_param("Reader", "top_k", 3i64)
                .with_debug(true)
                .with_debug_logs(true),
        )
        .await
        .unwrap();

    for node in ["ESRetriever", "Reader"] {
        let entry = debug_entry(&output, node).unwrap();
        let input = entry["input"].as_object().unwrap();
        let output = entry["output"].as_object().unwrap();
        assert!(!input.is_empty());
        assert!(!output.is_empty());
        // debug_logs renders everything as text
        assert!(input.values().all(|v| matches!(v, Value::String(_))));
    }

    let retriever_input = debug_entry(&output, "ESRetriever").unwrap()["input"].as_object().unwrap();
    assert_eq!(retriever_input["query"], Value::from("Who lives in Berlin?"));
    assert_eq!(retriever_input["top_k"], Value::from("10"));
}

#[tokio::test]
async fn test_debug_attributes_per_node() {
    let pipeline = retriever_reader();
    let output = pipeline
        .run(
            RunRequest::new("Who lives in Berlin?")
                .with_param("ESRetriever", "top_k", 10i64)
                .with_param("ESRetriever", "debug", true)
                .with_param("ESRetriever", "debug_logs", true)
                .with_param("Reader", "top_k", 3i64),
        )
        .await
        .unwrap();

    let entry = debug_entry(&output, "ESRetriever").unwrap();
    assert!(entry.contains_key("input"));
    assert!(entry.contains_key("output"));
    assert!(debug_entry(&output, "Reader").is_none());

    // The debug switches are not passed on as node params
    assert_eq!(output["top_k"], Value::Number(3.0));
}

#[tokio::test]
async fn test_global_debug_attributes_override_node_ones() {
    let pipeline = retriever_reader();

    let output = pipeline
        .run(
            RunRequest::new("Who lives in Berlin?")
                .with_param("ESRetriever", "debug", true)
                .with_param("ESRetriever", "debug_logs", true)
                .with_param("Reader", "debug", true)
                .with_debug(false),
        )
        .await
        .unwrap();
    assert!(!output.contains_key(DEBUG_KEY));

    let output = pipeline
        .run(
            RunRequest::new("Who lives in Berlin?")
                .with_param("ESRetriever", "debug", false)
                .with_param("Reader", "debug", false)
                .with_debug(true),
        )
        .await
        .unwrap();
    for node in ["ESRetriever", "Reader"] {
        let entry = debug_entry(&output, node).unwrap();
        // Without debug_logs the captured values keep their types
        assert_eq!(entry["input"].as_object().unwrap()["query"], Value::from("Who lives in Berlin?"));
        assert!(entry.contains_key("output"));
    }
}

#[tokio::test]
async fn test_no_debug_key_when_nothing_captured() {
    let pipeline = retriever_reader();
    let output = pipeline.run(RunRequest::new("Who made the PDF specification?")).await.unwrap();
    assert_eq!(output["query"], Value::from("Who made the PDF specification?"));
    assert!(!output.contains_key(DEBUG_KEY));
}

/// Appends `letter` and reports a debug entry of its own
struct Reporting {
    letter: &'static str,
    check_upstream: Option<&'static str>,
}

#[async_trait]
impl Node for Reporting {
    fn node_type(&self) -> &str {
        "test.reporting"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if let Some(upstream) = self.check_upstream {
            let entry = ctx
                .upstream_debug
                .get(upstream)
                .and_then(Value::as_object)
                .ok_or_else(|| NodeError::MissingInput(format!("_debug.{}", upstream)))?;
            assert_eq!(entry["debug_key_b"], Value::from("debug_value_b"));
            return Ok(NodeOutput::new().with_output("test", self.letter));
        }

        let mut debug = ValueMap::new();
        debug.insert(
            format!("debug_key_{}", self.letter.to_lowercase()),
            Value::from(format!("debug_value_{}", self.letter.to_lowercase())),
        );
        Ok(NodeOutput::new()
            .with_output("test", self.letter)
            .with_output(DEBUG_KEY, Value::Object(debug)))
    }
}

#[tokio::test]
async fn test_debug_info_propagation() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("A", Arc::new(Reporting { letter: "A", check_upstream: None }), ["Query"])
        .unwrap();
    pipeline
        .add_node("B", Arc::new(Reporting { letter: "B", check_upstream: None }), ["A"])
        .unwrap();
    pipeline.add_node("C", append("test", "C"), ["B"]).unwrap();
    pipeline
        .add_node("D", Arc::new(Reporting { letter: "D", check_upstream: Some("B") }), ["C"])
        .unwrap();

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(debug_entry(&output, "A").unwrap()["debug_key_a"], Value::from("debug_value_a"));
    assert_eq!(debug_entry(&output, "B").unwrap()["debug_key_b"], Value::from("debug_value_b"));
    assert!(debug_entry(&output, "C").is_none());

    // Run-level debug=false hides node-supplied entries as well
    let output = pipeline.run(RunRequest::new("test").with_debug(false)).await.unwrap();
    assert!(!output.contains_key(DEBUG_KEY));
}

#[tokio::test]
async fn test_invalid_run_args() {
    let pipeline = retriever_reader();

    let mut args = ValueMap::new();
    args.insert("params".to_string(), Value::Object(ValueMap::new()));
    let err = pipeline.run_with_args(args).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Run(RunError::InvalidRunArgument { ref argument, .. }) if argument == "query"
    ));
    assert!(err.to_string().contains("missing 1 required argument: 'query'"));

    let mut args = ValueMap::new();
    args.insert("invalid_query".to_string(), Value::from("Who made the PDF specification?"));
    let err = pipeline.run_with_args(args).await.unwrap_err();
    assert!(err.to_string().contains("run() got an unexpected keyword argument 'invalid_query'"));

    let err = pipeline
        .run(RunRequest::new("Who made the PDF specification?").with_param("ESRetriever", "invalid", 10i64))
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Invalid parameter 'invalid' for the node 'ESRetriever'"));

    // The pipeline is still usable after run-time errors
    assert!(pipeline.run(RunRequest::new("q")).await.is_ok());
}

#[tokio::test]
async fn test_params_for_skipped_node_are_never_checked() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("A", Start::branching("v", Route::Output(1)), ["Query"]).unwrap();
    pipeline.add_node("Keyword", append("v", "K"), ["A.output_1"]).unwrap();
    pipeline.add_node("Question", Arc::new(Retriever), ["A.output_2"]).unwrap();

    let output = pipeline
        .run(RunRequest::new("q").with_param("Question", "not_accepted", 1i64))
        .await
        .unwrap();
    assert_eq!(run_output(&output, "v"), "AK");

    let err = pipeline
        .run(RunRequest::new("q").with_param("Nowhere", "top_k", 1i64))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Run(RunError::UnknownParamsTarget(ref n)) if n == "Nowhere"));
}

struct Failing;

#[async_trait]
impl Node for Failing {
    fn node_type(&self) -> &str {
        "test.failing"
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ExecutionFailed("index unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_node_error_aborts_run_unchanged() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let mut pipeline = Pipeline::new().with_metrics(metrics.clone());
    pipeline.add_node("Retriever", Arc::new(Retriever), ["Query"]).unwrap();
    pipeline.add_node("Reader", Arc::new(Failing), ["Retriever"]).unwrap();
    pipeline.add_node("After", Arc::new(Retriever), ["Reader"]).unwrap();

    let err = pipeline.run(RunRequest::new("q").with_debug(true)).await.unwrap_err();
    assert_eq!(
        err.node_error(),
        Some(&NodeError::ExecutionFailed("index unavailable".to_string()))
    );
    assert!(matches!(err, PipelineError::Node { ref node, .. } if node == "Reader"));

    assert_eq!(metrics.node("Reader").unwrap().failures, 1);
    assert!(metrics.node("After").is_none());
    assert_eq!(metrics.snapshot().failed_runs, 1);
}

/// Declares one edge but routes to a second
struct Misrouted;

#[async_trait]
impl Node for Misrouted {
    fn node_type(&self) -> &str {
        "test.misrouted"
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_route(Route::Output(2)))
    }
}

#[tokio::test]
async fn test_route_outside_declared_edges_fails_run() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("M", Arc::new(Misrouted), ["Query"]).unwrap();

    let err = pipeline.run(RunRequest::new("q")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Run error: Node 'M' returned route 'output_2' outside its declared outgoing edges"
    );
}

#[tokio::test]
async fn test_parallel_execution_keeps_join_order() {
    init_tracing();

    let metrics = Arc::new(InMemoryMetrics::new());
    let mut pipeline = Pipeline::with_config(RuntimeConfig {
        max_parallel_nodes: 4,
        ..RuntimeConfig::default()
    })
    .with_metrics(metrics.clone());
    pipeline.add_node("A", Start::new("test"), ["Query"]).unwrap();
    // The first declared branch finishes last
    pipeline.add_node("Slow", slow_append("test", "S", 60), ["A"]).unwrap();
    pipeline.add_node("Medium", slow_append("test", "M", 30), ["A"]).unwrap();
    pipeline.add_node("Fast", slow_append("test", "F", 0), ["A"]).unwrap();
    pipeline.add_node("Join", concat("test"), ["Slow", "Medium", "Fast"]).unwrap();

    let output = pipeline.run(RunRequest::new("test")).await.unwrap();
    assert_eq!(run_output(&output, "test"), "ASAMAF");
    assert!(metrics.snapshot().nodes.values().all(|stats| stats.invocations == 1));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("Slow", slow_append("query", "!", 20), ["Query"]).unwrap();
    pipeline.add_node("ESRetriever", Arc::new(Retriever), ["Slow"]).unwrap();

    let (first, second) = tokio::join!(
        pipeline.run(RunRequest::new("first").with_debug(true)),
        pipeline.run(RunRequest::new("second").with_param("ESRetriever", "top_k", 1i64)),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(run_output(&first, "query"), "first!");
    assert_eq!(run_output(&second, "query"), "second!");
    assert!(first.contains_key(DEBUG_KEY));
    assert!(!second.contains_key(DEBUG_KEY));
    assert_eq!(second["top_k"], Value::Number(1.0));
    assert_eq!(first["top_k"], Value::Number(10.0));
}

#[tokio::test]
async fn test_multiple_sinks_merge_later_declared_wins() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("A", Start::new("test"), ["Query"]).unwrap();
    pipeline.add_node("First", append("test", "1"), ["A"]).unwrap();
    pipeline.add_node("Second", append("test", "2"), ["A"]).unwrap();

    let output = pipeline.run(RunRequest::new("q")).await.unwrap();
    assert_eq!(run_output(&output, "test"), "A2");
}

#[tokio::test]
async fn test_empty_pipeline_returns_seed_values() {
    let pipeline = Pipeline::new();
    let output = pipeline.run(RunRequest::new("only the query")).await.unwrap();
    assert_eq!(output["query"], Value::from("only the query"));
}

#[tokio::test]
async fn test_run_events_bracket_node_events() {
    let mut pipeline = Pipeline::new();
    pipeline.add_node("ESRetriever", Arc::new(Retriever), ["Query"]).unwrap();
    let mut events = pipeline.subscribe_events();

    pipeline.run(RunRequest::new("q")).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            ExecutionEvent::RunStarted { .. } => "run_started",
            ExecutionEvent::NodeStarted { .. } => "node_started",
            ExecutionEvent::NodeCompleted { .. } => "node_completed",
            ExecutionEvent::RunCompleted { success, .. } => {
                assert!(success);
                "run_completed"
            }
            _ => "other",
        });
    }
    assert_eq!(kinds, vec!["run_started", "node_started", "node_completed", "run_completed"]);
}
