//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{LoopingLlmClient, MockLlmClient, ScriptedLlmClient, ScriptedTurn};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, TokenStream};

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
///
/// 没有可用 API Key 时退回 Mock，服务仍可启动。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        "deepseek" => {
            let key = cfg
                .llm
                .api_key
                .clone()
                .or_else(|| env_key("DEEPSEEK_API_KEY"))
                .or_else(|| env_key("OPENAI_API_KEY"));
            match key {
                Some(key) => {
                    tracing::info!(model = %cfg.llm.model, "Using DeepSeek LLM");
                    Arc::new(create_deepseek_client(Some(&cfg.llm.model), Some(&key)))
                }
                None => {
                    tracing::warn!("No DeepSeek API key set, using Mock LLM");
                    Arc::new(MockLlmClient)
                }
            }
        }
        "openai" => {
            let key = cfg.llm.api_key.clone().or_else(|| env_key("OPENAI_API_KEY"));
            match key {
                Some(key) => {
                    tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
                    Arc::new(OpenAiClient::new(
                        cfg.llm.base_url.as_deref(),
                        &cfg.llm.model,
                        Some(&key),
                    ))
                }
                None => {
                    tracing::warn!("No OpenAI API key set, using Mock LLM");
                    Arc::new(MockLlmClient)
                }
            }
        }
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}
