//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：回显最后一条 User 消息（纯文本回复）
//! - ScriptedLlmClient：按顺序回放预设输出，流式时按空白切分为多个 token；可在指定位置注入流中断或卡住
//! - LoopingLlmClient：永远提出同一个工具调用，用于验证步数上限

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};

use crate::llm::{LlmClient, TokenStream};
use crate::memory::{Message, Role};

/// 把文本切成保留空白的 token，模拟逐 token 输出
fn tokenize(content: &str) -> Vec<Result<String, String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        current.push(c);
        if c.is_whitespace() {
            tokens.push(Ok(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        tokens.push(Ok(current));
    }
    tokens
}

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        let content = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(tokenize(&content))))
    }
}

/// 单次脚本输出
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// 完整输出
    Output(String),
    /// 先输出部分文本，然后流中断
    Interrupted { partial: String, error: String },
    /// 直接调用失败（连流都没建立）
    Fail(String),
    /// 先输出部分文本，之后再也不产出 token
    Stall { partial: String },
}

/// 按顺序回放预设输出；脚本耗尽后返回空回复
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    /// 每次调用收到的消息（测试断言用）
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(outputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::with_turns(outputs.into_iter().map(|o| ScriptedTurn::Output(o.into())))
    }

    pub fn with_turns(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_turn(&self, messages: &[Message]) -> ScriptedTurn {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        self.turns
            .lock()
            .ok()
            .and_then(|mut t| t.pop_front())
            .unwrap_or_else(|| ScriptedTurn::Output(String::new()))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        match self.next_turn(messages) {
            ScriptedTurn::Output(s) => Ok(s),
            ScriptedTurn::Interrupted { error, .. } | ScriptedTurn::Fail(error) => Err(error),
            ScriptedTurn::Stall { .. } => future::pending().await,
        }
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, String> {
        match self.next_turn(messages) {
            ScriptedTurn::Output(s) => Ok(Box::pin(stream::iter(tokenize(&s)))),
            ScriptedTurn::Interrupted { partial, error } => {
                let mut items = tokenize(&partial);
                items.push(Err(error));
                Ok(Box::pin(stream::iter(items)))
            }
            ScriptedTurn::Fail(error) => Err(error),
            ScriptedTurn::Stall { partial } => Ok(Box::pin(
                stream::iter(tokenize(&partial)).chain(stream::pending()),
            )),
        }
    }
}

/// 永远提出同一个工具调用
#[derive(Debug, Clone)]
pub struct LoopingLlmClient {
    output: String,
}

impl LoopingLlmClient {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

#[async_trait]
impl LlmClient for LoopingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Ok(self.output.clone())
    }

    async fn complete_stream(&self, _messages: &[Message]) -> Result<TokenStream, String> {
        Ok(Box::pin(stream::iter(tokenize(&self.output))))
    }
}
