//! 桥接层错误类型
//!
//! 所有内部失败统一为 BridgeError；Display 文本带有分类关键字（Backend / timeout / stream 等），
//! 交由 ErrorClassifier 做子串分类后再序列化给客户端。

use thiserror::Error;

/// 桥接过程中可能出现的错误（参数校验、网络、超时、后端、LLM、流）
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 工具参数不满足 schema（多余字段、类型不符、缺字段）
    #[error("Tool `{tool}` arguments rejected by schema (additionalProperties/type check): {detail}")]
    SchemaValidation { tool: String, detail: String },

    #[error("Unknown tool `{0}` rejected by schema (additionalProperties): not one of the registered tools")]
    UnknownTool(String),

    /// 模型写了 "tool" 键，但输出不是合法的工具调用对象
    #[error("Tool call rejected by schema (additionalProperties/JSON syntax check): {0}")]
    JsonParseError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM stream interrupted: {0}")]
    Stream(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
