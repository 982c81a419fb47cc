//! 后端调度判定
//!
//! 根据 startWorkflow 的参数判断本轮是否需要真正调用后端编排服务。
//! 任一条件满足即调度：leadData.twitter_username 存在；leadId 含 `@`；
//! 任一初始任务描述（不区分大小写）包含 contact / twitter / @。

use crate::backend::LeadData;
use crate::workflow::WorkflowTask;

const TASK_TRIGGER_WORDS: [&str; 3] = ["contact", "twitter", "@"];

/// 触发调度的原因（用于日志）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReason {
    TwitterUsername,
    LeadIdHandle,
    TaskMentions { task_index: usize, trigger: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    Dispatch(DispatchReason),
    /// 仅对话，不发起网络请求
    ConversationOnly,
}

impl DispatchDecision {
    pub fn should_dispatch(&self) -> bool {
        matches!(self, DispatchDecision::Dispatch(_))
    }
}

/// 调度判定器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchClassifier;

impl DispatchClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(
        &self,
        lead_id: &str,
        lead_data: Option<&LeadData>,
        initial_tasks: &[WorkflowTask],
    ) -> DispatchDecision {
        if lead_data.map(LeadData::has_twitter_username).unwrap_or(false) {
            return DispatchDecision::Dispatch(DispatchReason::TwitterUsername);
        }
        if lead_id.contains('@') {
            return DispatchDecision::Dispatch(DispatchReason::LeadIdHandle);
        }
        for (task_index, task) in initial_tasks.iter().enumerate() {
            let description = task.description.to_lowercase();
            if let Some(trigger) = TASK_TRIGGER_WORDS.iter().copied().find(|w| description.contains(w)) {
                return DispatchDecision::Dispatch(DispatchReason::TaskMentions {
                    task_index,
                    trigger,
                });
            }
        }
        DispatchDecision::ConversationOnly
    }
}
