//! 对话流事件：每个事件序列化为一行 NDJSON 推给客户端

use serde::Serialize;

use crate::core::ErrorEnvelope;
use crate::tools::{RequestUserDecisionParams, RequestUserInformationParams, ToolResult};
use crate::workflow::WorkflowState;

/// 本轮结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// 模型给出了文本回复
    Stop,
    /// 等待用户提供信息或决策
    AwaitingUser,
    /// 达到步数上限
    StepLimit,
    /// 单步失败且配置为不继续
    Error,
    /// 客户端已断开
    Disconnected,
}

/// 单个流事件（`type` 字段区分）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionStarted {
        session_id: String,
        max_steps: usize,
    },
    /// 第几步（从 1 开始）
    StepUpdate { step: usize, max_steps: usize },
    /// 文本增量（逐 token）
    TextDelta { text: String },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    ToolResult { tool: String, result: ToolResult },
    WorkflowUpdate {
        state: WorkflowState,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    UserInputRequest {
        request: RequestUserInformationParams,
    },
    UserDecisionRequest {
        request: RequestUserDecisionParams,
    },
    /// 已分类的错误；本轮是否继续由后续事件体现
    Error { step: usize, envelope: ErrorEnvelope },
    StepLimitReached { max_steps: usize },
    /// 本轮 token 增量
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Done { finish_reason: FinishReason },
}

impl ChatEvent {
    /// 序列化为一行 NDJSON（含换行）
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self)
            .unwrap_or_else(|e| format!("{{\"type\":\"error\",\"details\":\"{}\"}}", e));
        line.push('\n');
        line
    }
}
