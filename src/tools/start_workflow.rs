//! startWorkflow：初始化工作流，并按判定结果调用后端编排服务
//!
//! 后端若返回 Agent 的直接回复（data.result），则组合为文本结果，让模型原样转述；
//! 否则返回工作流快照与调度结果的 JSON。

use schemars::JsonSchema;
use serde::Deserialize;

use crate::backend::{BackendDispatchResult, DispatchClassifier, LeadData, LeadDispatcher, LeadRecord};
use crate::tools::{ToolOutcome, ToolResult};
use crate::workflow::{WorkflowState, WorkflowTask, WorkflowTracker};

pub const NAME: &str = "startWorkflow";
pub const DESCRIPTION: &str = "Start a new workflow for a lead. Declares the agent and the ordered initial tasks. \
When the lead has a Twitter handle or a task asks to contact the lead, the backend orchestrator is called.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartWorkflowParams {
    pub workflow_id: String,
    pub agent_name: String,
    pub lead_id: String,
    pub initial_tasks: Vec<WorkflowTask>,
    #[serde(default)]
    pub lead_data: Option<LeadData>,
}

pub async fn execute(
    params: StartWorkflowParams,
    tracker: &mut WorkflowTracker,
    dispatcher: &dyn LeadDispatcher,
    classifier: &DispatchClassifier,
) -> ToolOutcome {
    let decision = classifier.decide(
        &params.lead_id,
        params.lead_data.as_ref(),
        &params.initial_tasks,
    );

    let dispatch = if decision.should_dispatch() {
        tracing::info!(lead_id = %params.lead_id, reason = ?decision, "dispatching to backend");
        let descriptions: Vec<&str> = params
            .initial_tasks
            .iter()
            .map(|t| t.description.as_str())
            .collect();
        let lead = LeadRecord::normalize(&params.lead_id, params.lead_data.as_ref(), &descriptions);
        dispatcher.dispatch(&lead).await
    } else {
        tracing::debug!(lead_id = %params.lead_id, "conversation only, backend not called");
        BackendDispatchResult::skipped()
    };

    let mut state = WorkflowState::new(params.workflow_id, params.agent_name, params.initial_tasks);
    state.metadata.insert("leadId".to_string(), params.lead_id.into());
    state.metadata.insert("backendAttempted".to_string(), dispatch.attempted.into());
    state.metadata.insert("backendSuccess".to_string(), dispatch.success.into());
    let state = tracker.start(state).clone();

    let result = match dispatch.agent_reply() {
        Some(reply) => ToolResult::Text(compose_agent_reply(&state, reply)),
        None => ToolResult::Json(serde_json::json!({
            "workflow": state,
            "backendDispatch": dispatch,
        })),
    };

    ToolOutcome {
        tool: NAME,
        result,
        workflow: Some(state),
        dispatch: Some(dispatch),
        user_request: None,
        warnings: Vec::new(),
    }
}

fn compose_agent_reply(state: &WorkflowState, reply: &str) -> String {
    format!(
        "Workflow {} started with agent {}.\n\nBackend agent response:\n{}\n\n\
         Relay the backend agent response above to the user verbatim.",
        state.workflow_id, state.current_agent, reply
    )
}
