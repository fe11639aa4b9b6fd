//! Decomposition node: splits a complex problem into an `ErrorDag` of
//! subproblems when complexity warrants it.

use langgraph_core::Message;
use llm::PromptBundle;
use serde::Deserialize;

use crate::state::{ErrorDag, GraphState, GraphStateDelta, NodeName};

use super::context::NodeContext;

const DECOMPOSITION_COMPLEXITY_THRESHOLD: i64 = 8;

#[derive(Debug, Deserialize)]
struct RawDecomposition {
    #[serde(rename = "shouldDecompose")]
    should_decompose: bool,
    #[serde(default)]
    dag: Option<ErrorDag>,
}

pub async fn run(state: &GraphState, ctx: &NodeContext<'_>) -> GraphStateDelta {
    if state.problem_complexity <= DECOMPOSITION_COMPLEXITY_THRESHOLD {
        return GraphStateDelta {
            current_node: Some(NodeName::Planning),
            ..Default::default()
        };
    }

    let prompt = format!(
        "The following problem is complex enough to consider decomposing into \
         independent subproblems. Respond with JSON {{shouldDecompose, dag: {{nodes, edges, \
         rootProblem}}}}.\n\n{}",
        state.refined_problem_statement
    );
    let bundle = PromptBundle::new(vec![Message::human(prompt)]).json();

    let response = match llm::generate_with_retry(ctx.model, bundle, ctx.retry).await {
        Ok(r) => r,
        Err(_) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Planning),
                ..Default::default()
            }
        }
    };

    let parsed: RawDecomposition = match serde_json::from_str(&response.text) {
        Ok(v) => v,
        Err(_) => {
            return GraphStateDelta {
                current_node: Some(NodeName::Planning),
                ..Default::default()
            }
        }
    };

    if !parsed.should_decompose {
        return GraphStateDelta {
            current_node: Some(NodeName::Planning),
            ..Default::default()
        };
    }

    let Some(dag) = parsed.dag.filter(ErrorDag::is_valid) else {
        return GraphStateDelta {
            current_node: Some(NodeName::Planning),
            ..Default::default()
        };
    };

    let next_node_id = dag.next_node(&state.solved_nodes).map(|n| n.id.clone());

    GraphStateDelta {
        current_node: Some(NodeName::Planning),
        current_node_id: Some(next_node_id),
        error_dag: Some(dag),
        ..Default::default()
    }
}
