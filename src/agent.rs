//! 桥接运行时
//!
//! create_agent_components 按配置构建 Planner（LLM + system 提示词）与 ToolExecutor（后端网关 + 超时），
//! 组件在所有请求间共享；process_message_stream 对一次 chat 请求跑流式对话主循环。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::backend::{BackendGateway, LeadDispatcher};
use crate::config::{AppConfig, ChatSection};
use crate::core::BridgeError;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::ConversationTrace;
use crate::react::{build_system_prompt, run_chat_turn, ChatEvent, ChatSession, Planner, TurnSummary};
use crate::tools::ToolExecutor;

/// 预构建的组件：Planner、ToolExecutor 与对话配置，可多请求共享
pub struct AgentComponents {
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub chat: ChatSection,
}

impl AgentComponents {
    /// 用给定的 LLM 与后端调度器组装（测试中注入 Mock）
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<dyn LeadDispatcher>,
        chat: ChatSection,
    ) -> Self {
        let planner = Planner::new(llm, build_system_prompt(chat.max_steps));
        let executor = ToolExecutor::new(dispatcher, chat.tool_timeout());
        Self {
            planner,
            executor,
            chat,
        }
    }

    /// LLM 建立流与等待 token 的超时
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.planner = self.planner.with_request_timeout(timeout);
        self
    }

    pub fn session(&self) -> ChatSession<'_> {
        ChatSession::new(&self.planner, &self.executor)
            .with_max_steps(self.chat.max_steps)
            .with_continue_on_step_error(self.chat.continue_on_step_error)
    }
}

/// 从配置创建组件：LLM 按 [llm] 选择，后端网关使用注入的 [backend] base_url 与超时
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, BridgeError> {
    let llm = create_llm_from_config(cfg);
    let gateway = BackendGateway::new(cfg.backend.base_url.clone(), cfg.backend.timeout())?;
    tracing::info!(
        backend = %gateway.endpoint(),
        max_steps = cfg.chat.max_steps,
        llm_timeout_secs = cfg.llm.timeouts.request,
        "agent components ready"
    );
    Ok(AgentComponents::new(llm, Arc::new(gateway), cfg.chat.clone())
        .with_llm_timeout(cfg.llm.request_timeout()))
}

/// 流式处理一次 chat 请求：事件通过 event_tx 推送，返回本轮摘要
pub async fn process_message_stream(
    components: &AgentComponents,
    trace: &mut ConversationTrace,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
) -> TurnSummary {
    run_chat_turn(&components.session(), trace, &event_tx).await
}
