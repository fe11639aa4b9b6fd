//! The explicit collaborator bundle node handlers are given. Handlers
//! never reach for a singleton; everything they can call through is a
//! field here.

use crate::loop_detector::HallucinationTracker;
use crate::ports::{Classifier, ComplexityEstimator, FileDiscovery, LanguageModel, LogSource, MetricsSink, PersistencePort};
use crate::sandbox::Sandbox;

pub struct NodeContext<'a> {
    pub group_id: &'a str,
    pub run_id: &'a str,
    pub sandbox: &'a dyn Sandbox,
    pub model: &'a dyn LanguageModel,
    pub log_source: &'a dyn LogSource,
    pub classifier: &'a dyn Classifier,
    pub complexity_estimator: &'a dyn ComplexityEstimator,
    pub file_discovery: &'a dyn FileDiscovery,
    pub metrics: &'a dyn MetricsSink,
    pub persistence: &'a dyn PersistencePort,
    pub hallucinations: &'a std::sync::Mutex<HallucinationTracker>,
    pub byte_budget: usize,
    pub retry: &'a llm::RetryConfig,
}
