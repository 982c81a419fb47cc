//! 工作流工具：startWorkflow / updateWorkflow / completeWorkflow / requestUserInformation / requestUserDecision

pub mod complete_workflow;
pub mod executor;
pub mod registry;
pub mod request_user;
pub mod start_workflow;
pub mod update_workflow;

use serde::Serialize;

use crate::backend::BackendDispatchResult;
use crate::workflow::WorkflowState;

pub use complete_workflow::CompleteWorkflowParams;
pub use executor::ToolExecutor;
pub use registry::{tool_schema_json, tool_specs, ToolInvocation, ToolSpec};
pub use request_user::{RequestUserDecisionParams, RequestUserInformationParams, UserRequest};
pub use start_workflow::StartWorkflowParams;

/// 工具结果：JSON 信封，或需要模型原样转述的文本
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Json(serde_json::Value),
    Text(String),
}

impl ToolResult {
    /// 写回对话轨迹的观察文本
    pub fn as_observation(&self) -> String {
        match self {
            ToolResult::Json(v) => v.to_string(),
            ToolResult::Text(t) => t.clone(),
        }
    }
}

/// 一次工具执行的完整产出
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool: &'static str,
    pub result: ToolResult,
    /// 执行后的工作流快照
    pub workflow: Option<WorkflowState>,
    /// 仅 startWorkflow 产生
    pub dispatch: Option<BackendDispatchResult>,
    /// 需要用户回应时结束本轮
    pub user_request: Option<UserRequest>,
    pub warnings: Vec<String>,
}
