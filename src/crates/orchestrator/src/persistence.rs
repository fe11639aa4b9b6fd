//! Thin write-only wrapper tying `MetricsSink` and `PersistencePort`
//! together at the two moments the coordinator needs to emit both: a
//! terminal outcome, and a successful sandbox write.

use serde_json::Value;

use crate::ports::{MetricsSink, PersistencePort};
use crate::state::GraphState;

pub struct PersistenceRecorder<'a> {
    pub metrics: &'a dyn MetricsSink,
    pub persistence: &'a dyn PersistencePort,
}

impl<'a> PersistenceRecorder<'a> {
    pub fn new(metrics: &'a dyn MetricsSink, persistence: &'a dyn PersistencePort) -> Self {
        Self {
            metrics,
            persistence,
        }
    }

    /// Called once per terminal outcome of a run group.
    pub async fn record_terminal_outcome(
        &self,
        group_id: &str,
        success: bool,
        iterations: u32,
        latency_ms: u64,
        reason: Option<&str>,
    ) {
        self.metrics
            .record_fix_attempt(group_id, success, iterations, latency_ms, reason)
            .await;
        self.metrics
            .record_outcome(group_id, if success { "success" } else { "failed" })
            .await;
    }

    /// Called once per successful sandbox write.
    pub async fn record_file_write(&self, group_id: &str, path: &str) {
        self.persistence.record_file_modification(group_id, path).await;
    }

    pub async fn record_reward(&self, group_id: &str, reward: f64, payload: Value) {
        self.persistence
            .record_reward_signal(group_id, reward, payload)
            .await;
    }

    pub async fn checkpoint(&self, group_id: &str, state: &GraphState) -> crate::error::Result<()> {
        self.persistence.save_state(group_id, state).await
    }

    pub async fn restore(&self, group_id: &str) -> crate::error::Result<Option<GraphState>> {
        self.persistence.load_state(group_id).await
    }

    pub async fn clear(&self, group_id: &str) -> crate::error::Result<()> {
        self.persistence.delete_state(group_id).await
    }
}
