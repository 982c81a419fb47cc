//! updateWorkflow：模型声明新的完整工作流状态，原样回显并附时间戳

use crate::tools::{ToolOutcome, ToolResult};
use crate::workflow::{WorkflowState, WorkflowTracker};

pub const NAME: &str = "updateWorkflow";
pub const DESCRIPTION: &str = "Replace the current workflow state (agent, step, progress 0-100, status, ordered tasks, metadata). \
Send the full state every time and keep task order stable.";

pub fn execute(state: WorkflowState, tracker: &mut WorkflowTracker) -> ToolOutcome {
    let warnings: Vec<String> = tracker
        .apply_update(state)
        .iter()
        .map(|w| w.to_string())
        .collect();
    let state = tracker.state().cloned();
    ToolOutcome {
        tool: NAME,
        result: ToolResult::Json(serde_json::json!({
            "workflow": state,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "warnings": warnings,
        })),
        workflow: state,
        dispatch: None,
        user_request: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{TaskStatus, WorkflowTask};

    #[test]
    fn test_echo_with_timestamp() {
        let mut tracker = WorkflowTracker::new();
        let mut state = WorkflowState::new("wf", "a", vec![WorkflowTask::new("t1", "x", "x")]);
        state.progress = 40;
        let out = execute(state.clone(), &mut tracker);
        let ToolResult::Json(v) = &out.result else {
            panic!("expected json");
        };
        assert_eq!(v["workflow"]["progress"], 40);
        assert!(v["timestamp"].is_string());
        assert_eq!(out.workflow, Some(state));
    }

    #[test]
    fn test_regression_reported_not_rejected() {
        let mut tracker = WorkflowTracker::new();
        let mut state = WorkflowState::new("wf", "a", vec![]);
        state.progress = 70;
        execute(state.clone(), &mut tracker);
        state.progress = 10;
        state.status = TaskStatus::InProgress;
        let out = execute(state, &mut tracker);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.workflow.unwrap().progress, 10);
    }
}
