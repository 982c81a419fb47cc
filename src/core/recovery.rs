//! 错误分类与恢复信封
//!
//! 任何失败（参数 schema、网络、超时、后端不可用、数据库权限、流处理）都按固定优先级做子串匹配，
//! 得到 ClassifiedError；再包装成 ErrorEnvelope（HTTP 200 + fallback.action = "continue"），
//! 保证调用方永远拿到可渲染的 JSON，而不是传输层错误。

use serde::Serialize;

/// 错误类别（序列化为 errorType）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 工具参数形状被拒绝
    PydanticSchema,
    Network,
    Timeout,
    BackendUnavailable,
    DatabaseSecurity,
    StreamProcessing,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::PydanticSchema,
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::BackendUnavailable,
        ErrorKind::DatabaseSecurity,
        ErrorKind::StreamProcessing,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PydanticSchema => "pydantic_schema",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::DatabaseSecurity => "database_security",
            ErrorKind::StreamProcessing => "stream_processing",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// 面向用户的简短说明
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::PydanticSchema => {
                "I had trouble structuring that workflow request. Let me try a simpler approach."
            }
            ErrorKind::Network => "I'm having trouble reaching the workflow service right now.",
            ErrorKind::Timeout => "The workflow service took too long to respond.",
            ErrorKind::BackendUnavailable => "The workflow backend is currently unavailable.",
            ErrorKind::DatabaseSecurity => {
                "I couldn't access that data because of a permissions check."
            }
            ErrorKind::StreamProcessing => "The response stream was interrupted.",
            ErrorKind::Unknown => "Something unexpected happened while processing your request.",
        }
    }

    /// 每个类别固定且非空的建议列表
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorKind::PydanticSchema => &[
                "Try rephrasing your request with fewer details at once",
                "Describe one lead or one task at a time",
                "Continue the conversation; the assistant can retry with a simpler workflow",
            ],
            ErrorKind::Network => &[
                "Check your internet connection",
                "Try again in a few moments",
                "Continue the conversation; no data was lost",
            ],
            ErrorKind::Timeout => &[
                "The request may still complete in the background",
                "Try again with a smaller request",
                "Check the workflow dashboard for progress",
            ],
            ErrorKind::BackendUnavailable => &[
                "The backend service may be restarting; try again shortly",
                "You can keep planning the workflow in chat meanwhile",
                "Contact support if the problem persists",
            ],
            ErrorKind::DatabaseSecurity => &[
                "Verify that you are signed in to the right workspace",
                "Ask an administrator to check your access permissions",
            ],
            ErrorKind::StreamProcessing => &[
                "Refresh the page and resend your last message",
                "Continue the conversation; the previous steps were kept",
            ],
            ErrorKind::Unknown => &[
                "Try sending your message again",
                "Rephrase your request",
                "Contact support if the problem persists",
            ],
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已分类的错误：类别 + 面向用户的文案 + 建议
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub recoverable: bool,
    pub timestamp: String,
    /// 原始错误文本（写入信封的 details）
    #[serde(skip)]
    pub details: String,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, details: String) -> Self {
        Self {
            kind,
            user_message: kind.user_message().to_string(),
            suggestions: kind.suggestions().iter().map(|s| s.to_string()).collect(),
            recoverable: true,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details,
        }
    }

    /// 转为 HTTP 层的恢复信封
    pub fn into_envelope(self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: "api_error".to_string(),
            error_type: self.kind,
            message: self.user_message.clone(),
            details: self.details,
            recoverable: self.recoverable,
            timestamp: self.timestamp,
            suggestions: self.suggestions,
            fallback: Fallback {
                response: format!(
                    "{} I'll keep going with what I have; feel free to continue the conversation.",
                    self.user_message
                ),
                action: "continue".to_string(),
            },
        }
    }
}

/// 外层捕获后返回给调用方的 JSON（始终以 200 返回）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub error_type: ErrorKind,
    pub message: String,
    pub details: String,
    pub recoverable: bool,
    pub timestamp: String,
    pub suggestions: Vec<String>,
    pub fallback: Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Fallback {
    pub response: String,
    pub action: String,
}

type Rule = (fn(&str) -> bool, ErrorKind);

fn mentions_schema(m: &str) -> bool {
    m.contains("additionalProperties")
}

fn mentions_network(m: &str) -> bool {
    m.to_lowercase().contains("network")
}

fn mentions_timeout(m: &str) -> bool {
    let lower = m.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

fn mentions_backend(m: &str) -> bool {
    m.contains("Backend")
}

fn mentions_security(m: &str) -> bool {
    m.contains("RLS") || m.to_lowercase().contains("security")
}

fn mentions_stream(m: &str) -> bool {
    m.to_lowercase().contains("stream")
}

/// 分类规则，按顺序匹配，首个命中即返回
const RULES: &[Rule] = &[
    (mentions_schema, ErrorKind::PydanticSchema),
    (mentions_network, ErrorKind::Network),
    (mentions_timeout, ErrorKind::Timeout),
    (mentions_backend, ErrorKind::BackendUnavailable),
    (mentions_security, ErrorKind::DatabaseSecurity),
    (mentions_stream, ErrorKind::StreamProcessing),
];

/// 错误分类器：对任何输入都给出 ClassifiedError，自身不会失败
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn kind_of(&self, message: &str) -> ErrorKind {
        RULES
            .iter()
            .find(|(applies, _)| applies(message))
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    pub fn classify(&self, message: &str) -> ClassifiedError {
        ClassifiedError::new(self.kind_of(message), message.to_string())
    }

    pub fn classify_error<E: std::fmt::Display + ?Sized>(&self, err: &E) -> ClassifiedError {
        self.classify(&err.to_string())
    }

    /// 非 Error 值（如前端回传的任意 JSON）：优先取 message 字段，其次字符串本身
    pub fn classify_value(&self, value: &serde_json::Value) -> ClassifiedError {
        let message = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => match map.get("message") {
                Some(serde_json::Value::String(s)) => s.clone(),
                _ => value.to_string(),
            },
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        self.classify(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BridgeError;

    #[test]
    fn test_priority_order() {
        let c = ErrorClassifier::new();
        // schema 优先于 network
        assert_eq!(
            c.kind_of("network: additionalProperties not allowed"),
            ErrorKind::PydanticSchema
        );
        // timeout 优先于 Backend
        assert_eq!(c.kind_of("Backend request timeout"), ErrorKind::Timeout);
        assert_eq!(c.kind_of("Backend returned 503"), ErrorKind::BackendUnavailable);
        assert_eq!(c.kind_of("new row violates RLS policy"), ErrorKind::DatabaseSecurity);
        assert_eq!(c.kind_of("stream closed early"), ErrorKind::StreamProcessing);
        assert_eq!(c.kind_of("something odd"), ErrorKind::Unknown);
        assert_eq!(c.kind_of(""), ErrorKind::Unknown);
    }

    #[test]
    fn test_bridge_errors_map_to_kinds() {
        let c = ErrorClassifier::new();
        let schema = BridgeError::SchemaValidation {
            tool: "startWorkflow".into(),
            detail: "missing field `leadId`".into(),
        };
        assert_eq!(c.classify_error(&schema).kind, ErrorKind::PydanticSchema);
        assert_eq!(
            c.classify_error(&BridgeError::UnknownTool("x".into())).kind,
            ErrorKind::PydanticSchema
        );
        assert_eq!(
            c.classify_error(&BridgeError::Network("connection refused".into())).kind,
            ErrorKind::Network
        );
        assert_eq!(c.classify_error(&BridgeError::Timeout(std::time::Duration::from_secs(30))).kind, ErrorKind::Timeout);
        assert_eq!(
            c.classify_error(&BridgeError::BackendUnavailable("HTTP 502".into())).kind,
            ErrorKind::BackendUnavailable
        );
        assert_eq!(
            c.classify_error(&BridgeError::Stream("eof".into())).kind,
            ErrorKind::StreamProcessing
        );
    }

    #[test]
    fn test_every_kind_has_suggestions() {
        for kind in ErrorKind::ALL {
            assert!(!kind.suggestions().is_empty(), "{kind} has no suggestions");
            assert!(!kind.user_message().is_empty());
        }
    }

    #[test]
    fn test_reclassifying_own_message_is_total() {
        let c = ErrorClassifier::new();
        for msg in ["Backend down", "timeout", "??", "RLS", "additionalProperties"] {
            let first = c.classify(msg);
            let again = c.classify(&first.user_message);
            assert!(!again.suggestions.is_empty());
            assert!(again.recoverable);
        }
    }

    #[test]
    fn test_classify_value_non_error_inputs() {
        let c = ErrorClassifier::new();
        assert_eq!(c.classify_value(&serde_json::Value::Null).kind, ErrorKind::Unknown);
        assert_eq!(c.classify_value(&serde_json::json!(42)).kind, ErrorKind::Unknown);
        assert_eq!(
            c.classify_value(&serde_json::json!({"message": "fetch failed: network down"})).kind,
            ErrorKind::Network
        );
        assert_eq!(
            c.classify_value(&serde_json::json!("stream aborted")).kind,
            ErrorKind::StreamProcessing
        );
    }

    #[test]
    fn test_envelope_shape() {
        let env = ErrorClassifier::new().classify("operation timed out").into_envelope();
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["error"], "api_error");
        assert_eq!(v["errorType"], "timeout");
        assert_eq!(v["recoverable"], true);
        assert_eq!(v["fallback"]["action"], "continue");
        assert_eq!(v["details"], "operation timed out");
        assert!(v["suggestions"].as_array().map(|a| !a.is_empty()).unwrap_or(false));
    }
}
