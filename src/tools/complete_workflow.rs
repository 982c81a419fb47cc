//! completeWorkflow：强制 completed / progress 100，并记录完成时间

use schemars::JsonSchema;
use serde::Deserialize;

use crate::tools::{ToolOutcome, ToolResult};
use crate::workflow::WorkflowTracker;

pub const NAME: &str = "completeWorkflow";
pub const DESCRIPTION: &str = "Mark the workflow as completed. List the ids of the tasks that were completed \
and optionally attach the final results.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompleteWorkflowParams {
    pub workflow_id: String,
    #[serde(default)]
    pub final_results: Option<serde_json::Value>,
    pub completed_tasks: Vec<String>,
}

pub fn execute(params: CompleteWorkflowParams, tracker: &mut WorkflowTracker) -> ToolOutcome {
    let (state, warnings) =
        tracker.complete(&params.workflow_id, &params.completed_tasks, params.final_results);
    let state = state.clone();
    let warnings: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
    ToolOutcome {
        tool: NAME,
        result: ToolResult::Json(serde_json::json!({ "workflow": state, "warnings": warnings })),
        workflow: Some(state),
        dispatch: None,
        user_request: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TaskStatus;

    #[test]
    fn test_complete_any_task_list() {
        for completed in [vec![], vec!["t1".to_string()], vec!["a".into(), "b".into()]] {
            let mut tracker = WorkflowTracker::new();
            let out = execute(
                CompleteWorkflowParams {
                    workflow_id: "wf".into(),
                    final_results: None,
                    completed_tasks: completed,
                },
                &mut tracker,
            );
            let state = out.workflow.unwrap();
            assert_eq!(state.progress, 100);
            assert_eq!(state.status, TaskStatus::Completed);
        }
    }
}
