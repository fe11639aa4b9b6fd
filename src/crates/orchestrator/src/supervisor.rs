//! Owns sandbox lifecycle, bounded parallelism across `RunGroup`s, and the
//! process-wide file-reservation registry that keeps two groups from
//! editing the same path concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::coordinator::{self, CoordinatorConfig};
use crate::nodes::NodeContext;
use crate::ports::StateCallbackPayload;
use crate::sandbox::{Sandbox, SandboxGuard};
use crate::state::{GraphState, LogLevel, NodeName};

pub const DEFAULT_MAX_PARALLEL_GROUPS: usize = 4;

/// Mutex-guarded `path -> holding group id` map. At most one holder per
/// path at a time.
#[derive(Default)]
pub struct FileReservationRegistry {
    holders: Mutex<HashMap<String, String>>,
}

impl FileReservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every path in `paths` is free or `timeout` elapses.
    /// On timeout, returns the path and the group currently holding it.
    pub async fn acquire(
        &self,
        paths: &[String],
        group_id: &str,
        timeout: Duration,
    ) -> Result<(), (String, String)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut holders = self.holders.lock().await;
                let conflict = paths.iter().find_map(|p| {
                    holders
                        .get(p)
                        .filter(|holder| holder.as_str() != group_id)
                        .map(|holder| (p.clone(), holder.clone()))
                });
                match conflict {
                    None => {
                        for path in paths {
                            holders.insert(path.clone(), group_id.to_string());
                        }
                        return Ok(());
                    }
                    Some((path, holder)) => {
                        if tokio::time::Instant::now() >= deadline {
                            return Err((path, holder));
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(("".to_string(), "".to_string()));
            }
        }
    }

    /// Releases every path this group holds. Always safe to call, even
    /// if the group never held any of them — every exit path (success,
    /// failure, panic unwinding through a guard) must call this.
    pub async fn release(&self, group_id: &str) {
        let mut holders = self.holders.lock().await;
        holders.retain(|_, holder| holder != group_id);
    }
}

pub trait StateCallback: Send + Sync {
    fn on_update(&self, group_id: &str, payload: StateCallbackPayload);
}

pub trait LogCallback: Send + Sync {
    fn on_log(&self, level: LogLevel, message: &str, agent_id: Option<&str>, agent_name: Option<&str>);
}

pub struct Supervisor {
    pub registry: Arc<FileReservationRegistry>,
    pub concurrency: Arc<Semaphore>,
    pub lock_wait_timeout: Duration,
    pub coordinator_config: CoordinatorConfig,
}

impl Supervisor {
    pub fn new(max_parallel_groups: usize, lock_wait_timeout: Duration, coordinator_config: CoordinatorConfig) -> Self {
        Self {
            registry: Arc::new(FileReservationRegistry::new()),
            concurrency: Arc::new(Semaphore::new(max_parallel_groups.max(1))),
            lock_wait_timeout,
            coordinator_config,
        }
    }

    pub fn from_config(config: &crate::config::OrchestratorConfig) -> Self {
        Self::new(
            config.max_parallel_groups,
            config.lock_wait_timeout,
            CoordinatorConfig::from(config),
        )
    }

    /// Runs one `RunGroup` end to end: acquires a concurrency slot,
    /// tears the sandbox down on every exit path, and releases any file
    /// reservations the group picked up along the way regardless of how
    /// the run ends.
    pub async fn run_group<S: Sandbox>(
        &self,
        sandbox: S,
        mut state: GraphState,
        ctx_builder: impl for<'a> Fn(&'a S) -> NodeContext<'a>,
        state_callback: &dyn StateCallback,
        log_callback: &dyn LogCallback,
        group_id: &str,
    ) -> GraphState {
        let _permit = self.concurrency.acquire().await.expect("semaphore closed");
        let guard = SandboxGuard::new(sandbox);

        log_callback.on_log(LogLevel::Info, "run group starting", None, None);

        let result = self
            .drive(&guard, &mut state, &ctx_builder, state_callback, log_callback, group_id)
            .await;

        self.registry.release(group_id).await;

        if let Err(e) = result {
            warn!(group_id, "run group ended with error: {e}");
        }

        if let Err(e) = guard.teardown().await {
            warn!(group_id, "sandbox teardown failed: {e}");
        }

        log_callback.on_log(LogLevel::Info, "run group finished", None, None);
        state
    }

    async fn drive<S: Sandbox>(
        &self,
        guard: &SandboxGuard<S>,
        state: &mut GraphState,
        ctx_builder: &impl for<'a> Fn(&'a S) -> NodeContext<'a>,
        state_callback: &dyn StateCallback,
        log_callback: &dyn LogCallback,
        group_id: &str,
    ) -> crate::error::Result<()> {
        let sandbox = guard.get();

        while !state.is_terminal() {
            let needs_lock = state.current_node == NodeName::Execution
                && state
                    .diagnosis
                    .as_ref()
                    .and_then(|d| d.file_path.clone())
                    .is_some();

            let target_path = state
                .diagnosis
                .as_ref()
                .and_then(|d| d.file_path.clone());

            if needs_lock {
                if let Some(path) = &target_path {
                    if let Err((contested, holder)) = self
                        .registry
                        .acquire(std::slice::from_ref(path), group_id, self.lock_wait_timeout)
                        .await
                    {
                        state.feedback.push(format!(
                            "Lock contention on {contested}: held by group {holder}"
                        ));
                        state.current_node = NodeName::Analysis;
                        continue;
                    }
                    state.file_reservations = vec![path.clone()];
                }
            }

            let ctx = ctx_builder(sandbox);
            coordinator::tick(state, &ctx, &self.coordinator_config).await;

            if needs_lock {
                self.registry.release(group_id).await;
                state.file_reservations.clear();
            }

            state_callback.on_update(
                group_id,
                serde_json::to_value(&*state).unwrap_or(serde_json::Value::Null),
            );
            log_callback.on_log(
                LogLevel::Info,
                &format!("tick complete: node={:?} iteration={}", state.current_node, state.iteration),
                None,
                None,
            );
        }

        info!(group_id, status = ?state.status, "group reached terminal state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStateCallback;
    impl StateCallback for NoopStateCallback {
        fn on_update(&self, _group_id: &str, _payload: StateCallbackPayload) {}
    }

    struct NoopLogCallback;
    impl LogCallback for NoopLogCallback {
        fn on_log(&self, _level: LogLevel, _message: &str, _agent_id: Option<&str>, _agent_name: Option<&str>) {}
    }

    #[tokio::test]
    async fn registry_blocks_second_group_until_release() {
        let registry = FileReservationRegistry::new();
        let paths = vec!["f.py".to_string()];
        registry.acquire(&paths, "group-a", Duration::from_millis(200)).await.unwrap();

        let err = registry
            .acquire(&paths, "group-b", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.0, "f.py");
        assert_eq!(err.1, "group-a");

        registry.release("group-a").await;
        registry.acquire(&paths, "group-b", Duration::from_millis(200)).await.unwrap();
    }

    #[tokio::test]
    async fn run_group_tears_down_sandbox_on_finish() {
        use crate::loop_detector::HallucinationTracker;
        use crate::ports::test_support::*;
        use crate::sandbox::test_support::FakeSandbox;
        use llm::test_support::FakeLanguageModel;
        use std::sync::Mutex as StdMutex;

        let sandbox = FakeSandbox::new("sbx");
        let model = FakeLanguageModel::new(vec![]);
        let log_source = FakeLogSource {
            logs: Default::default(),
        };
        let classifier = FakeClassifier {
            result: crate::ports::ClassificationResult {
                category: crate::state::ErrorCategory::Unknown,
                confidence: 0.0,
                suggested_action: "none".into(),
            },
        };
        let estimator = FakeComplexityEstimator { value: 0 };
        let discovery = FakeFileDiscovery { paths: vec![] };
        let metrics = RecordingMetricsSink::default();
        let persistence = InMemoryPersistence::default();
        let hallucinations = StdMutex::new(HallucinationTracker::new());
        let retry = llm::RetryConfig::default();

        let mut state = GraphState::new(1);
        state.current_node = NodeName::Finish;

        let supervisor = Supervisor::new(2, Duration::from_millis(100), CoordinatorConfig::default());

        let final_state = supervisor
            .run_group(
                sandbox,
                state,
                |sbx| NodeContext {
                    group_id: "group-1",
                    run_id: "run-1",
                    sandbox: sbx,
                    model: &model,
                    log_source: &log_source,
                    classifier: &classifier,
                    complexity_estimator: &estimator,
                    file_discovery: &discovery,
                    metrics: &metrics,
                    persistence: &persistence,
                    hallucinations: &hallucinations,
                    byte_budget: 8000,
                    retry: &retry,
                },
                &NoopStateCallback,
                &NoopLogCallback,
                "group-1",
            )
            .await;

        assert_eq!(final_state.current_node, NodeName::Finish);
    }
}
