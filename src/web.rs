//! HTTP 接口
//!
//! - POST /api/chat：NDJSON 流式对话；请求体按原始字节读取，任何解析失败都以 200 + 错误信封返回
//! - GET /api/health：健康检查
//! - GET /api/tools：工具名称、说明与参数 JSON Schema

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::agent::{process_message_stream, AgentComponents};
use crate::backend::LeadData;
use crate::core::{ErrorClassifier, ErrorEnvelope};
use crate::memory::{ConversationTrace, Message, Role};
use crate::react::{ChatEvent, FinishReason};
use crate::tools::{tool_specs, ToolSpec};

const NDJSON: &str = "application/x-ndjson; charset=utf-8";
const X_STREAM_VERSION: &str = "x-stream-version";
const X_ERROR_RECOVERY: &str = "x-error-recovery";

/// 路由共享状态
pub struct AppState {
    pub components: AgentComponents,
    pub classifier: ErrorClassifier,
}

impl AppState {
    pub fn new(components: AgentComponents) -> Self {
        Self {
            components,
            classifier: ErrorClassifier::new(),
        }
    }
}

/// 客户端消息；role 为任意字符串，未知角色按 user 处理
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// POST /api/chat 请求体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub lead_data: Option<LeadData>,
    #[serde(default)]
    pub direct_processing: Option<bool>,
}

impl ChatRequest {
    /// 构建对话轨迹；带 leadData 时作为一条 system 上下文放在最前面
    fn into_trace(self) -> ConversationTrace {
        let mut trace = ConversationTrace::new();
        if let Some(lead) = &self.lead_data {
            let lead_json = serde_json::to_string(lead).unwrap_or_default();
            trace.push(Message::system(format!(
                "Lead data provided by the client (use it for startWorkflow leadData): {lead_json}"
            )));
        }
        for m in self.messages {
            trace.push(Message {
                role: Role::from_wire(&m.role),
                content: m.content,
            });
        }
        trace
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/tools", get(api_tools_list))
        .with_state(state)
}

async fn api_tools_list() -> Json<Vec<ToolSpec>> {
    Json(tool_specs())
}

/// 200 + 错误信封（外层捕获）
fn envelope_response(envelope: ErrorEnvelope) -> Response {
    let mut res = (StatusCode::OK, Json(envelope)).into_response();
    res.headers_mut()
        .insert(X_ERROR_RECOVERY, HeaderValue::from_static("enabled"));
    res
}

fn deprecated_response() -> Response {
    let body = serde_json::json!({
        "error": "direct_processing_deprecated",
        "message": "Direct lead processing has been removed. Send the lead in a chat message and the assistant will start the workflow.",
        "recoverable": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "fallback": {
            "response": "Please describe what you want to do with this lead in the chat.",
            "action": "continue",
        },
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// 流式聊天：NDJSON，每行一个 ChatEvent
async fn api_chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let classified = state
                .classifier
                .classify(&format!("Invalid chat request body: {e}"));
            tracing::warn!(kind = %classified.kind, error = %e, "rejecting chat request");
            return envelope_response(classified.into_envelope());
        }
    };

    if req.direct_processing == Some(true) && req.lead_data.is_some() {
        tracing::info!("direct processing requested, answering with deprecation notice");
        return deprecated_response();
    }

    if req.messages.is_empty() {
        let classified = state
            .classifier
            .classify("Invalid chat request body: messages must not be empty");
        return envelope_response(classified.into_envelope());
    }

    let mut trace = req.into_trace();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ChatEvent>();

    let state_spawn = Arc::clone(&state);
    let turn_tx = event_tx.clone();
    let turn = tokio::spawn(async move {
        process_message_stream(&state_spawn.components, &mut trace, turn_tx).await
    });

    // 主循环自身的故障（panic 等）在这里再捕获一次，仍以事件写入流
    let classifier = state.classifier;
    tokio::spawn(async move {
        if let Err(e) = turn.await {
            let classified = classifier.classify(&format!("chat stream task failed: {e}"));
            tracing::error!(kind = %classified.kind, error = %e, "chat turn aborted");
            let _ = event_tx.send(ChatEvent::Error {
                step: 0,
                envelope: classified.into_envelope(),
            });
            let _ = event_tx.send(ChatEvent::Done {
                finish_reason: FinishReason::Error,
            });
        }
    });

    type BoxErr = Box<dyn std::error::Error + Send + Sync>;
    let stream = stream::unfold(event_rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|ev| (Ok::<Bytes, BoxErr>(Bytes::from(ev.to_ndjson())), rx))
    });

    let stream_version = HeaderValue::from_str(&state.components.chat.stream_version)
        .unwrap_or_else(|_| HeaderValue::from_static("2"));
    let mut res = Response::new(Body::from_stream(stream));
    let headers = res.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(NDJSON));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(X_STREAM_VERSION, stream_version);
    headers.insert(X_ERROR_RECOVERY, HeaderValue::from_static("enabled"));
    res
}
