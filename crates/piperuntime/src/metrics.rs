use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Receives timing information from the scheduler
pub trait MetricsCollector: Send + Sync {
    fn node_finished(&self, node: &str, elapsed: Duration, success: bool);

    fn run_finished(&self, _elapsed: Duration, _success: bool) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn node_finished(&self, _node: &str, _elapsed: Duration, _success: bool) {}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NodeStats {
    pub invocations: u64,
    pub failures: u64,
    pub total_time: Duration,
}

impl NodeStats {
    pub fn mean_time(&self) -> Option<Duration> {
        let nanos = self.total_time.as_nanos().checked_div(u128::from(self.invocations))?;
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub runs: u64,
    pub failed_runs: u64,
    pub run_time: Duration,
    pub nodes: HashMap<String, NodeStats>,
}

/// Keeps counters in memory, shared across all runs of a pipeline
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn node(&self, name: &str) -> Option<NodeStats> {
        self.lock().nodes.get(name).cloned()
    }

    pub fn reset(&self) {
        *self.lock() = MetricsSnapshot::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsSnapshot> {
        // A panicking node cannot leave the counters half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn node_finished(&self, node: &str, elapsed: Duration, success: bool) {
        let mut inner = self.lock();
        let stats = inner.nodes.entry(node.to_string()).or_default();
        stats.invocations += 1;
        stats.total_time += elapsed;
        if !success {
            stats.failures += 1;
        }
    }

    fn run_finished(&self, elapsed: Duration, success: bool) {
        let mut inner = self.lock();
        inner.runs += 1;
        inner.run_time += elapsed;
        if !success {
            inner.failed_runs += 1;
        }
    }
}
