//! requestUserInformation / requestUserDecision：非阻塞的用户升级
//!
//! 产出结构化请求（前端渲染为表单或选项），工作流挂起为 need-help，本轮对话结束；
//! 用户的下一条消息继续流程。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{ToolOutcome, ToolResult};
use crate::workflow::{TaskPriority, WorkflowTracker};

pub const INFORMATION_NAME: &str = "requestUserInformation";
pub const INFORMATION_DESCRIPTION: &str = "Ask the user for missing information (for example an email address or a Twitter handle). \
Ends the current turn; the user's answer arrives as the next message.";

pub const DECISION_NAME: &str = "requestUserDecision";
pub const DECISION_DESCRIPTION: &str = "Ask the user to choose between options before continuing. \
Ends the current turn; the user's choice arrives as the next message.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestUserInformationParams {
    pub question: String,
    pub information_needed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub priority: TaskPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestUserDecisionParams {
    pub decision_needed: String,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

/// 交给传输层渲染的用户请求
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserRequest {
    Information(RequestUserInformationParams),
    Decision(RequestUserDecisionParams),
}

pub fn request_information(
    params: RequestUserInformationParams,
    tracker: &mut WorkflowTracker,
) -> ToolOutcome {
    let workflow = tracker.mark_need_help(&params.question).cloned();
    let request = UserRequest::Information(params);
    outcome(INFORMATION_NAME, request, workflow)
}

pub fn request_decision(
    params: RequestUserDecisionParams,
    tracker: &mut WorkflowTracker,
) -> ToolOutcome {
    let workflow = tracker.mark_need_help(&params.decision_needed).cloned();
    let request = UserRequest::Decision(params);
    outcome(DECISION_NAME, request, workflow)
}

fn outcome(
    tool: &'static str,
    request: UserRequest,
    workflow: Option<crate::workflow::WorkflowState>,
) -> ToolOutcome {
    ToolOutcome {
        tool,
        result: ToolResult::Json(serde_json::json!({
            "request": request,
            "status": "awaiting_user",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
        workflow,
        dispatch: None,
        user_request: Some(request),
        warnings: Vec::new(),
    }
}
