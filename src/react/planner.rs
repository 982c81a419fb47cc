//! Planner：调用 LLM 与 Tool Call 解析
//!
//! 模型以单个 JSON 对象 {"tool": "...", "args": {...}} 提出工具调用（可包在 ```json 围栏中），
//! 其余输出都是给用户的文本。parse_llm_output 只做第一阶段（JSON 语法），
//! 第二阶段由 ToolInvocation::parse 做强类型校验。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::core::BridgeError;
use crate::llm::{LlmClient, TokenStream};
use crate::memory::Message;

/// LLM 返回的 Tool Call（未校验）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 输出开头是否像工具调用（JSON 对象或代码围栏）；用于决定是否逐 token 转发
pub fn looks_like_tool_call(output: &str) -> Option<bool> {
    output
        .trim_start()
        .chars()
        .next()
        .map(|c| c == '{' || c == '`')
}

/// 缓冲的候选输出里是否写了 "tool" 键；没有则只是以花括号开头的普通文本
fn mentions_tool_key(json_str: &str) -> bool {
    json_str.contains("\"tool\"")
}

/// 解析 LLM 输出：带 "tool" 键的 JSON 对象（可包在 ```json 围栏中）且 tool 非空则为 ToolCall，否则为 Response。
/// 写了 "tool" 键却不是合法 JSON 或形状不对时返回 JsonParseError；错误文本只含解析器的诊断，不含模型原文
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, BridgeError> {
    let trimmed = output.trim();

    let json_str = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if trimmed.starts_with('{') {
        match trimmed.rfind('}') {
            Some(end) => &trimmed[..=end],
            None => trimmed,
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    if !json_str.starts_with('{') {
        // 围栏里不是 JSON 对象（例如一段代码示例），按文本处理
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    }

    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) if mentions_tool_key(json_str) => return Err(BridgeError::JsonParseError(e.to_string())),
        Err(_) => return Ok(PlannerOutput::Response(trimmed.to_string())),
    };
    if value.get("tool").is_none() {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    }

    let parsed: ToolCall =
        serde_json::from_value(value).map_err(|e| BridgeError::JsonParseError(e.to_string()))?;

    if parsed.tool.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// 建立流与等待下一个 token 的默认超时
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Planner：持有 LLM 与 system prompt，每次调用拼 system + 对话轨迹
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    request_timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            request_timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 流式规划：返回增量 token 流
    pub async fn plan_stream(&self, messages: &[Message]) -> Result<TokenStream, BridgeError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(self.system_prompt.clone()));
        full_messages.extend_from_slice(messages);
        tokio::time::timeout(self.request_timeout, self.llm.complete_stream(&full_messages))
            .await
            .map_err(|_| BridgeError::Timeout(self.request_timeout))?
            .map_err(BridgeError::LlmError)
    }

    /// 读取下一个 token；Ok(None) 表示流正常结束，超过 request_timeout 没有新 token 视为超时
    pub async fn next_token(&self, tokens: &mut TokenStream) -> Result<Option<String>, BridgeError> {
        match tokio::time::timeout(self.request_timeout, tokens.next()).await {
            Ok(Some(Ok(token))) => Ok(Some(token)),
            Ok(Some(Err(e))) => Err(BridgeError::Stream(e)),
            Ok(None) => Ok(None),
            Err(_) => Err(BridgeError::Timeout(self.request_timeout)),
        }
    }
}
