//! 工具注册表
//!
//! 五个工具构成封闭的 ToolInvocation 枚举：模型给出的 {"tool", "args"} 先按名称选择变体，
//! 再由 serde 做严格的参数校验（多余字段、类型错误、缺字段都会被拒绝）；校验失败不会执行。
//! 参数 schema 由 schemars 生成，拼入 system prompt 并通过 /api/tools 暴露。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::BridgeError;
use crate::react::ToolCall;
use crate::tools::{
    complete_workflow, request_user, start_workflow, update_workflow, CompleteWorkflowParams,
    RequestUserDecisionParams, RequestUserInformationParams, StartWorkflowParams,
};
use crate::workflow::WorkflowState;

/// 已通过校验的工具调用
#[derive(Debug, Clone)]
pub enum ToolInvocation {
    StartWorkflow(StartWorkflowParams),
    UpdateWorkflow(WorkflowState),
    CompleteWorkflow(CompleteWorkflowParams),
    RequestUserInformation(RequestUserInformationParams),
    RequestUserDecision(RequestUserDecisionParams),
}

impl ToolInvocation {
    /// 按名称选择工具并校验参数
    pub fn parse(call: &ToolCall) -> Result<Self, BridgeError> {
        let args = &call.args;
        match call.tool.as_str() {
            start_workflow::NAME => validate(&call.tool, args).map(Self::StartWorkflow),
            update_workflow::NAME => validate(&call.tool, args).map(Self::UpdateWorkflow),
            complete_workflow::NAME => validate(&call.tool, args).map(Self::CompleteWorkflow),
            request_user::INFORMATION_NAME => {
                validate(&call.tool, args).map(Self::RequestUserInformation)
            }
            request_user::DECISION_NAME => validate(&call.tool, args).map(Self::RequestUserDecision),
            other => Err(BridgeError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::StartWorkflow(_) => start_workflow::NAME,
            ToolInvocation::UpdateWorkflow(_) => update_workflow::NAME,
            ToolInvocation::CompleteWorkflow(_) => complete_workflow::NAME,
            ToolInvocation::RequestUserInformation(_) => request_user::INFORMATION_NAME,
            ToolInvocation::RequestUserDecision(_) => request_user::DECISION_NAME,
        }
    }
}

fn validate<T: DeserializeOwned>(tool: &str, args: &serde_json::Value) -> Result<T, BridgeError> {
    T::deserialize(args).map_err(|e| BridgeError::SchemaValidation {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

/// 单个工具的描述：名称、说明、参数 JSON Schema
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

fn spec<T: JsonSchema>(name: &'static str, description: &'static str) -> ToolSpec {
    let parameters = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}));
    ToolSpec {
        name,
        description,
        parameters,
    }
}

/// 全部工具的说明（顺序固定）
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        spec::<StartWorkflowParams>(start_workflow::NAME, start_workflow::DESCRIPTION),
        spec::<WorkflowState>(update_workflow::NAME, update_workflow::DESCRIPTION),
        spec::<CompleteWorkflowParams>(complete_workflow::NAME, complete_workflow::DESCRIPTION),
        spec::<RequestUserInformationParams>(
            request_user::INFORMATION_NAME,
            request_user::INFORMATION_DESCRIPTION,
        ),
        spec::<RequestUserDecisionParams>(request_user::DECISION_NAME, request_user::DECISION_DESCRIPTION),
    ]
}

/// 工具 schema JSON，可拼入 system prompt
pub fn tool_schema_json() -> String {
    serde_json::to_string_pretty(&tool_specs()).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorClassifier, ErrorKind};

    fn call(tool: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            tool: tool.to_string(),
            args,
        }
    }

    #[test]
    fn test_parse_start_workflow() {
        let inv = ToolInvocation::parse(&call(
            "startWorkflow",
            serde_json::json!({
                "workflowId": "wf-1",
                "agentName": "outreach",
                "leadId": "@janedoe",
                "initialTasks": [{"description": "say hello"}]
            }),
        ))
        .unwrap();
        assert_eq!(inv.name(), "startWorkflow");
        assert!(matches!(inv, ToolInvocation::StartWorkflow(p) if p.lead_id == "@janedoe"));
    }

    #[test]
    fn test_extra_field_is_schema_error() {
        let err = ToolInvocation::parse(&call(
            "completeWorkflow",
            serde_json::json!({"workflowId": "wf", "completedTasks": [], "bogus": 1}),
        ))
        .unwrap_err();
        assert!(matches!(err, BridgeError::SchemaValidation { .. }));
        assert_eq!(ErrorClassifier::new().classify_error(&err).kind, ErrorKind::PydanticSchema);
    }

    #[test]
    fn test_wrong_type_and_missing_field() {
        let err = ToolInvocation::parse(&call(
            "updateWorkflow",
            serde_json::json!({"workflowId": "wf", "progress": "half"}),
        ))
        .unwrap_err();
        assert!(matches!(err, BridgeError::SchemaValidation { ref tool, .. } if tool == "updateWorkflow"));

        let err = ToolInvocation::parse(&call(
            "requestUserDecision",
            serde_json::json!({"options": ["a"]}),
        ))
        .unwrap_err();
        assert!(matches!(err, BridgeError::SchemaValidation { .. }));
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolInvocation::parse(&call("deleteLead", serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(ref n) if n == "deleteLead"));
        assert_eq!(ErrorClassifier::new().classify_error(&err).kind, ErrorKind::PydanticSchema);
    }

    #[test]
    fn test_specs_cover_all_tools_with_strict_schemas() {
        let specs = tool_specs();
        let names: Vec<_> = specs.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "startWorkflow",
                "updateWorkflow",
                "completeWorkflow",
                "requestUserInformation",
                "requestUserDecision"
            ]
        );
        let start = &specs[0].parameters;
        assert_eq!(start["additionalProperties"], false);
        assert!(start["properties"]["leadId"].is_object());
        assert!(tool_schema_json().contains("requestUserDecision"));
    }
}
