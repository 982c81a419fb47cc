//! 工具执行器
//!
//! 对已校验的 ToolInvocation 做穷尽匹配并执行；整体施加超时（含后端调用），
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::backend::{DispatchClassifier, LeadDispatcher};
use crate::core::BridgeError;
use crate::tools::{
    complete_workflow, request_user, start_workflow, update_workflow, ToolInvocation, ToolOutcome,
};
use crate::workflow::WorkflowTracker;

/// 工具执行器：持有后端调度器与调度判定器
pub struct ToolExecutor {
    dispatcher: Arc<dyn LeadDispatcher>,
    classifier: DispatchClassifier,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(dispatcher: Arc<dyn LeadDispatcher>, timeout: Duration) -> Self {
        Self {
            dispatcher,
            classifier: DispatchClassifier::new(),
            timeout,
        }
    }

    /// 执行一次工具调用；超时返回 BridgeError::Timeout
    pub async fn execute(
        &self,
        invocation: ToolInvocation,
        tracker: &mut WorkflowTracker,
    ) -> Result<ToolOutcome, BridgeError> {
        let start = Instant::now();
        let tool = invocation.name();
        let args_preview = args_preview(&invocation);
        let result = timeout(self.timeout, self.run(invocation, tracker)).await;

        let (ok, outcome) = match &result {
            Ok(o) if o.dispatch.as_ref().map(|d| d.attempted && !d.success).unwrap_or(false) => {
                (false, "backend_error")
            }
            Ok(_) => (true, "ok"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        result.map_err(|_| BridgeError::Timeout(self.timeout))
    }

    async fn run(&self, invocation: ToolInvocation, tracker: &mut WorkflowTracker) -> ToolOutcome {
        match invocation {
            ToolInvocation::StartWorkflow(params) => {
                start_workflow::execute(params, tracker, self.dispatcher.as_ref(), &self.classifier)
                    .await
            }
            ToolInvocation::UpdateWorkflow(state) => update_workflow::execute(state, tracker),
            ToolInvocation::CompleteWorkflow(params) => complete_workflow::execute(params, tracker),
            ToolInvocation::RequestUserInformation(params) => {
                request_user::request_information(params, tracker)
            }
            ToolInvocation::RequestUserDecision(params) => {
                request_user::request_decision(params, tracker)
            }
        }
    }
}

fn args_preview(invocation: &ToolInvocation) -> String {
    let s = format!("{invocation:?}");
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
