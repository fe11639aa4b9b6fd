//! Drives one `RunGroup`'s `GraphState` to a terminal state: dispatches
//! the current node, merges its delta, then runs the gates that apply
//! regardless of which node just ran.

use tracing::{info, warn};

use crate::loop_detector::{evaluate_strategy_loop, strategy_loop_feedback_message};
use crate::nodes::{analysis, decomposition, execution, planning, verification, NodeContext};
use crate::state::{GraphState, GraphStateDelta, NodeName, RunStatus};

pub const REPRODUCTION_MISSING_MESSAGE: &str = "Reproduction command required";

pub struct CoordinatorConfig {
    pub strategy_loop_threshold: i64,
    pub strategy_loop_min_iteration: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            strategy_loop_threshold: 15,
            strategy_loop_min_iteration: 4,
        }
    }
}

impl From<&crate::config::OrchestratorConfig> for CoordinatorConfig {
    fn from(config: &crate::config::OrchestratorConfig) -> Self {
        Self {
            strategy_loop_threshold: config.strategy_loop_threshold,
            strategy_loop_min_iteration: config.strategy_loop_min_iteration,
        }
    }
}

/// Runs `state` forward until it reaches a terminal condition, yielding
/// control to the caller after each tick so it can invoke its own
/// `updateStateCallback`/`logCallback` (the supervisor's job, not this
/// function's).
pub async fn run_group(
    state: &mut GraphState,
    ctx: &NodeContext<'_>,
    config: &CoordinatorConfig,
) {
    while !state.is_terminal() {
        tick(state, ctx, config).await;
    }
}

/// Runs exactly one node, merges its delta, then applies the gates that
/// the coordinator — not any individual node — is responsible for.
/// Any unexpected error from a collaborator call during dispatch is
/// caught here and turned into a failed terminal state rather than
/// propagated, so one bad tick never aborts the whole group.
pub async fn tick(state: &mut GraphState, ctx: &NodeContext<'_>, config: &CoordinatorConfig) {
    let node = state.current_node;

    if matches!(node, NodeName::Execution | NodeName::RepairAgent) && reproduction_missing(state) {
        halt_on_missing_reproduction(state, ctx).await;
        return;
    }

    let delta = dispatch(node, state, ctx).await;
    delta.apply(state);
    state.iteration += 1;
    state.complexity_history.push(state.problem_complexity);

    ctx.metrics
        .record_iteration(ctx.group_id, state.iteration, state.problem_complexity)
        .await;

    let verdict = evaluate_strategy_loop(
        &state.complexity_history,
        state.iteration,
        config.strategy_loop_min_iteration,
        config.strategy_loop_threshold,
    );

    if verdict.should_halt {
        warn!(group_id = ctx.group_id, "strategy loop detected, halting group");
        state.status = RunStatus::Failed;
        state.current_node = NodeName::Finish;
        state.message = Some(format!(
            "Strategy loop detected. {}",
            strategy_loop_feedback_message()
        ));
    } else if verdict.warning_only {
        warn!(
            group_id = ctx.group_id,
            "complexity trend diverging but below halt threshold"
        );
    }

    if state.iteration >= state.max_iterations && !state.is_terminal() {
        state.status = RunStatus::Failed;
        state.current_node = NodeName::Finish;
        state.failure_reason = Some("max iterations reached".into());
    }

    info!(
        group_id = ctx.group_id,
        iteration = state.iteration,
        node = ?node,
        "tick complete"
    );
}

async fn dispatch(node: NodeName, state: &GraphState, ctx: &NodeContext<'_>) -> GraphStateDelta {
    match node {
        NodeName::Analysis => analysis::run(ctx).await,
        NodeName::Decomposition => decomposition::run(state, ctx).await,
        NodeName::Planning => planning::run(state, ctx).await,
        NodeName::Execution | NodeName::RepairAgent => execution::run(state, ctx).await,
        NodeName::Verification => verification::run(state, ctx).await,
        NodeName::Finish => GraphStateDelta::default(),
    }
}

fn reproduction_missing(state: &GraphState) -> bool {
    state
        .diagnosis
        .as_ref()
        .map(|d| d.reproduction_command.is_none())
        .unwrap_or(true)
}

async fn halt_on_missing_reproduction(state: &mut GraphState, ctx: &NodeContext<'_>) {
    state.status = RunStatus::Failed;
    state.current_node = NodeName::Finish;
    state.reproduction_command_missing = true;
    state.message = Some(REPRODUCTION_MISSING_MESSAGE.into());
    ctx.metrics
        .record_fix_attempt(
            ctx.group_id,
            false,
            state.iteration,
            0,
            Some("reproduction-command-missing"),
        )
        .await;
    warn!(
        group_id = ctx.group_id,
        "halting: no reproduction command set before execution"
    );
}
