//! Rule-based fallback routing for error classification.

pub mod evaluator;

pub use evaluator::{ConditionCheck, EvaluationContext, RouteRule, RuleCondition, RuleEvaluator};
