//! 后端网关：调用编排服务的单线索工作流接口
//!
//! POST {base_url}/api/process-lead-workflow；成功时解析 JSON，失败（非 2xx、超时、连接错误、
//! 响应非 JSON）时返回 success = false 的 BackendDispatchResult。调用方永远拿到完整结果，不会收到错误。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::backend::{BackendDispatchResult, LeadRecord};
use crate::core::BridgeError;

pub const LEAD_WORKFLOW_PATH: &str = "/api/process-lead-workflow";

/// 响应体预览最大字符数（写入错误信息）
const BODY_PREVIEW_CHARS: usize = 200;

/// 调度接口：真实实现为 BackendGateway，测试中可替换为计数 / 固定结果的实现
#[async_trait]
pub trait LeadDispatcher: Send + Sync {
    async fn dispatch(&self, lead: &LeadRecord) -> BackendDispatchResult;
}

/// 编排服务 HTTP 网关；base_url 在构造时注入
pub struct BackendGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl BackendGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::ConfigError(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, LEAD_WORKFLOW_PATH)
    }

    async fn post_lead(&self, lead: &LeadRecord) -> Result<serde_json::Value, BridgeError> {
        let resp = self
            .client
            .post(self.endpoint())
            .json(lead)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_reqwest_error(e))?;
        if !status.is_success() {
            return Err(BridgeError::BackendUnavailable(format!(
                "Backend returned HTTP {}: {}",
                status,
                preview(&body)
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            BridgeError::BackendUnavailable(format!("Backend returned invalid JSON: {e}"))
        })
    }

    fn map_reqwest_error(&self, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(self.timeout)
        } else {
            BridgeError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl LeadDispatcher for BackendGateway {
    async fn dispatch(&self, lead: &LeadRecord) -> BackendDispatchResult {
        let start = std::time::Instant::now();
        let result = self.post_lead(lead).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(payload) => {
                tracing::info!(endpoint = %self.endpoint(), duration_ms, "backend dispatch ok");
                BackendDispatchResult::succeeded(payload)
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint(), duration_ms, error = %e, "backend dispatch failed");
                BackendDispatchResult::failed(e.to_string())
            }
        }
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > BODY_PREVIEW_CHARS {
        format!("{}...", body.chars().take(BODY_PREVIEW_CHARS).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorClassifier, ErrorKind};
    use axum::{http::StatusCode, routing::post, Json, Router};

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn lead() -> LeadRecord {
        LeadRecord::normalize("@janedoe", None, &["say hello"])
    }

    #[tokio::test]
    async fn test_dispatch_success_relays_result() {
        let router = Router::new().route(
            LEAD_WORKFLOW_PATH,
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["workflow_type"], "single_lead");
                assert_eq!(body["email"], "@janedoe@example.com");
                Json(serde_json::json!({"data": {"result": "Hi Jane, DM sent."}}))
            }),
        );
        let base = spawn_backend(router).await;
        let gw = BackendGateway::new(format!("{base}/"), Duration::from_secs(5)).unwrap();
        let r = gw.dispatch(&lead()).await;
        assert!(r.attempted && r.success);
        assert_eq!(r.agent_reply(), Some("Hi Jane, DM sent."));
    }

    #[tokio::test]
    async fn test_dispatch_http_error_is_data() {
        let router = Router::new().route(
            LEAD_WORKFLOW_PATH,
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let base = spawn_backend(router).await;
        let gw = BackendGateway::new(base, Duration::from_secs(5)).unwrap();
        let r = gw.dispatch(&lead()).await;
        assert!(r.attempted && !r.success);
        let err = r.error.unwrap();
        assert!(err.contains("503"));
        assert_eq!(ErrorClassifier::new().kind_of(&err), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_dispatch_timeout_is_data() {
        let router = Router::new().route(
            LEAD_WORKFLOW_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(serde_json::json!({}))
            }),
        );
        let base = spawn_backend(router).await;
        let gw = BackendGateway::new(base, Duration::from_millis(200)).unwrap();
        let r = gw.dispatch(&lead()).await;
        assert!(r.attempted && !r.success);
        assert_eq!(ErrorClassifier::new().kind_of(&r.error.unwrap()), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_dispatch_connection_refused_is_data() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gw = BackendGateway::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let r = gw.dispatch(&lead()).await;
        assert!(r.attempted && !r.success);
        assert_eq!(ErrorClassifier::new().kind_of(&r.error.unwrap()), ErrorKind::Network);
    }
}
