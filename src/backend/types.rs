//! 后端编排服务的请求 / 响应结构

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 对话中携带的线索字段（结构开放，未知字段保留在 extra 中）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LeadData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LeadData {
    /// twitter_username 存在且非空
    pub fn has_twitter_username(&self) -> bool {
        self.twitter_username
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

/// POST /api/process-lead-workflow 的请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadRecord {
    pub workflow_type: String,
    pub email: String,
    pub name: String,
    pub company: String,
    pub phone: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_username: Option<String>,
    pub force_real_workflow: bool,
    pub debug_mode: bool,
}

impl LeadRecord {
    /// 由 leadId、线索字段与初始任务描述构建规范化的单线索请求
    pub fn normalize(lead_id: &str, lead: Option<&LeadData>, task_descriptions: &[&str]) -> Self {
        let lead = lead.cloned().unwrap_or_default();
        let message = non_empty(lead.message.as_ref()).unwrap_or_else(|| {
            if task_descriptions.is_empty() {
                format!("Process lead {lead_id}")
            } else {
                task_descriptions.join("; ")
            }
        });
        Self {
            workflow_type: "single_lead".to_string(),
            email: non_empty(lead.email.as_ref()).unwrap_or_else(|| format!("{lead_id}@example.com")),
            name: non_empty(lead.name.as_ref()).unwrap_or_else(|| lead_id.to_string()),
            company: non_empty(lead.company.as_ref()).unwrap_or_else(|| "Unknown".to_string()),
            phone: non_empty(lead.phone.as_ref()).unwrap_or_default(),
            message,
            twitter_username: non_empty(lead.twitter_username.as_ref()),
            force_real_workflow: true,
            debug_mode: true,
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// 一次后端调度的结果；网络 / 后端错误以数据形式返回，而不是向上抛出
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDispatchResult {
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl BackendDispatchResult {
    /// 判定无需调度：未发起网络请求
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn succeeded(payload: serde_json::Value) -> Self {
        Self {
            attempted: true,
            success: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            success: false,
            error: Some(error.into()),
            payload: None,
        }
    }

    /// 后端 Agent 的直接文本回复：payload.data.result
    pub fn agent_reply(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .get("data")?
            .get("result")?
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }
}
