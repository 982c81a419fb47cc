//! 流式对话主循环
//!
//! 每一步：调用 LLM（逐 token 转发文本）-> 若是工具调用则校验并执行 -> 结果写回对话轨迹 -> 下一步。
//! 步数有上限；单步失败分类后作为 error 事件写入流，按配置继续剩余步数。
//! 所有失败都变成事件，本函数自身不返回错误。

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{BridgeError, ErrorClassifier};
use crate::memory::{ConversationTrace, Message};
use crate::react::planner::{looks_like_tool_call, parse_llm_output, Planner, PlannerOutput};
use crate::react::{ChatEvent, FinishReason};
use crate::tools::{ToolExecutor, ToolInvocation, UserRequest};
use crate::workflow::{WorkflowState, WorkflowTracker};

/// 默认步数上限
pub const DEFAULT_MAX_STEPS: usize = 5;

const RETRY_HINT: &str = "Continue with the remaining steps: fix the tool call, or answer the user with what you have.";

/// 对话会话配置
pub struct ChatSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub classifier: ErrorClassifier,
    pub max_steps: usize,
    /// 单步失败后是否继续剩余步数
    pub continue_on_step_error: bool,
}

impl<'a> ChatSession<'a> {
    pub fn new(planner: &'a Planner, executor: &'a ToolExecutor) -> Self {
        Self {
            planner,
            executor,
            classifier: ErrorClassifier::new(),
            max_steps: DEFAULT_MAX_STEPS,
            continue_on_step_error: true,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_continue_on_step_error(mut self, enabled: bool) -> Self {
        self.continue_on_step_error = enabled;
        self
    }
}

/// 一轮对话的结果
#[derive(Debug)]
pub struct TurnSummary {
    pub finish_reason: FinishReason,
    /// 实际执行的步数
    pub steps: usize,
    /// 模型最后给出的文本回复（没有则为空）
    pub reply: String,
    pub workflow: Option<WorkflowState>,
}

enum StepOutcome {
    Answered(String),
    ToolExecuted,
    AwaitingUser,
}

fn send_event(tx: &UnboundedSender<ChatEvent>, ev: ChatEvent) {
    let _ = tx.send(ev);
}

/// 执行一轮对话，事件写入 event_tx；客户端断开（通道关闭）后在下一步开始前停止
pub async fn run_chat_turn(
    session: &ChatSession<'_>,
    trace: &mut ConversationTrace,
    event_tx: &UnboundedSender<ChatEvent>,
) -> TurnSummary {
    let max_steps = session.max_steps.max(1);
    let session_id = uuid::Uuid::new_v4().to_string();
    let (init_prompt, init_completion, _) = session.planner.token_usage();

    tracing::info!(session_id = %session_id, messages = trace.len(), max_steps, "chat turn started");
    send_event(
        event_tx,
        ChatEvent::SessionStarted {
            session_id: session_id.clone(),
            max_steps,
        },
    );

    let mut tracker = WorkflowTracker::new();
    let mut reply = String::new();
    let mut steps = 0;
    let mut finish = None;

    for step in 1..=max_steps {
        if event_tx.is_closed() {
            tracing::info!(session_id = %session_id, step, "client disconnected, stopping turn");
            finish = Some(FinishReason::Disconnected);
            break;
        }
        steps = step;
        send_event(event_tx, ChatEvent::StepUpdate { step, max_steps });

        match run_step(session, step, trace, &mut tracker, event_tx).await {
            Ok(StepOutcome::Answered(text)) => {
                reply = text;
                finish = Some(FinishReason::Stop);
                break;
            }
            Ok(StepOutcome::ToolExecuted) => {}
            Ok(StepOutcome::AwaitingUser) => {
                finish = Some(FinishReason::AwaitingUser);
                break;
            }
            Err(err) => {
                let classified = session.classifier.classify_error(&err);
                tracing::warn!(
                    session_id = %session_id,
                    step,
                    kind = %classified.kind,
                    error = %err,
                    "step failed"
                );
                trace.push(Message::user(format!(
                    "Observation: step {} failed ({}): {}. {}",
                    step, classified.kind, err, RETRY_HINT
                )));
                send_event(
                    event_tx,
                    ChatEvent::Error {
                        step,
                        envelope: classified.into_envelope(),
                    },
                );
                if !session.continue_on_step_error {
                    finish = Some(FinishReason::Error);
                    break;
                }
            }
        }
    }

    let finish_reason = match finish {
        Some(reason) => reason,
        None => {
            tracing::warn!(session_id = %session_id, max_steps, "step limit reached");
            send_event(event_tx, ChatEvent::StepLimitReached { max_steps });
            FinishReason::StepLimit
        }
    };

    let (cur_prompt, cur_completion, _) = session.planner.token_usage();
    let prompt_tokens = cur_prompt.saturating_sub(init_prompt);
    let completion_tokens = cur_completion.saturating_sub(init_completion);
    send_event(
        event_tx,
        ChatEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    );
    send_event(event_tx, ChatEvent::Done { finish_reason });
    tracing::info!(session_id = %session_id, steps, finish_reason = ?finish_reason, "chat turn finished");

    TurnSummary {
        finish_reason,
        steps,
        reply,
        workflow: tracker.state().cloned(),
    }
}

/// 单步：流式读取模型输出；文本逐 token 转发，疑似工具调用则缓冲到结束再解析执行
async fn run_step(
    session: &ChatSession<'_>,
    step: usize,
    trace: &mut ConversationTrace,
    tracker: &mut WorkflowTracker,
    event_tx: &UnboundedSender<ChatEvent>,
) -> Result<StepOutcome, BridgeError> {
    let mut tokens = session.planner.plan_stream(trace.messages()).await?;
    let mut output = String::new();
    let mut tool_candidate: Option<bool> = None;

    loop {
        match session.planner.next_token(&mut tokens).await {
            Ok(Some(token)) => {
                output.push_str(&token);
                match tool_candidate {
                    Some(false) => send_event(event_tx, ChatEvent::TextDelta { text: token }),
                    Some(true) => {}
                    None => {
                        tool_candidate = looks_like_tool_call(&output);
                        if tool_candidate == Some(false) {
                            send_event(
                                event_tx,
                                ChatEvent::TextDelta {
                                    text: output.clone(),
                                },
                            );
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                // 中断或超时：已转发的部分文本保留在轨迹里
                if !output.trim().is_empty() {
                    trace.push(Message::assistant(output.trim()));
                }
                return Err(e);
            }
        }
    }

    let text = output.trim().to_string();
    if tool_candidate != Some(true) {
        if !text.is_empty() {
            trace.push(Message::assistant(text.clone()));
        }
        return Ok(StepOutcome::Answered(text));
    }

    let call = match parse_llm_output(&output) {
        Ok(PlannerOutput::Response(text)) => {
            // 以花括号开头的普通回复：缓冲结束后一次性转发
            trace.push(Message::assistant(text.clone()));
            send_event(event_tx, ChatEvent::TextDelta { text: text.clone() });
            return Ok(StepOutcome::Answered(text));
        }
        Ok(PlannerOutput::ToolCall(call)) => {
            trace.push(Message::assistant(text));
            call
        }
        Err(e) => {
            tracing::debug!(step, raw = %text, "model output is not a valid tool call");
            trace.push(Message::assistant(text));
            return Err(e);
        }
    };

    send_event(
        event_tx,
        ChatEvent::ToolCall {
            tool: call.tool.clone(),
            args: call.args.clone(),
        },
    );
    let invocation = ToolInvocation::parse(&call)?;
    let outcome = session.executor.execute(invocation, tracker).await?;

    send_event(
        event_tx,
        ChatEvent::ToolResult {
            tool: outcome.tool.to_string(),
            result: outcome.result.clone(),
        },
    );
    if let Some(state) = &outcome.workflow {
        send_event(
            event_tx,
            ChatEvent::WorkflowUpdate {
                state: state.clone(),
                warnings: outcome.warnings.clone(),
            },
        );
    }
    trace.push(Message::user(format!(
        "Observation from {}: {}",
        outcome.tool,
        outcome.result.as_observation()
    )));

    // 后端失败已是数据：分类后写入流，本步仍算成功
    if let Some(dispatch) = outcome.dispatch.as_ref().filter(|d| d.attempted && !d.success) {
        let detail = dispatch.error.as_deref().unwrap_or("Backend dispatch failed");
        let classified = session.classifier.classify(detail);
        tracing::warn!(step, kind = %classified.kind, "backend dispatch failed, continuing in conversation");
        send_event(
            event_tx,
            ChatEvent::Error {
                step,
                envelope: classified.into_envelope(),
            },
        );
    }

    match outcome.user_request {
        Some(UserRequest::Information(request)) => {
            send_event(event_tx, ChatEvent::UserInputRequest { request });
            Ok(StepOutcome::AwaitingUser)
        }
        Some(UserRequest::Decision(request)) => {
            send_event(event_tx, ChatEvent::UserDecisionRequest { request });
            Ok(StepOutcome::AwaitingUser)
        }
        None => Ok(StepOutcome::ToolExecuted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::backend::{BackendDispatchResult, LeadDispatcher, LeadRecord};
    use crate::core::ErrorKind;
    use crate::llm::{LlmClient, LoopingLlmClient, ScriptedLlmClient, ScriptedTurn};
    use crate::tools::ToolResult;
    use crate::workflow::TaskStatus;

    struct StubDispatcher {
        result: BackendDispatchResult,
        calls: AtomicUsize,
    }

    impl StubDispatcher {
        fn new(result: BackendDispatchResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LeadDispatcher for StubDispatcher {
        async fn dispatch(&self, _lead: &LeadRecord) -> BackendDispatchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct Harness {
        planner: Planner,
        executor: ToolExecutor,
    }

    impl Harness {
        fn new(llm: Arc<dyn LlmClient>, dispatcher: Arc<dyn LeadDispatcher>) -> Self {
            Self {
                planner: Planner::new(llm, "system"),
                executor: ToolExecutor::new(dispatcher, Duration::from_secs(5)),
            }
        }

        fn session(&self) -> ChatSession<'_> {
            ChatSession::new(&self.planner, &self.executor)
        }
    }

    async fn run(session: &ChatSession<'_>, user: &str) -> (TurnSummary, Vec<ChatEvent>, ConversationTrace) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut trace = ConversationTrace::from_messages([Message::user(user)]);
        let summary = run_chat_turn(session, &mut trace, &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        (summary, events, trace)
    }

    fn error_kinds(events: &[ChatEvent]) -> Vec<ErrorKind> {
        events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Error { envelope, .. } => Some(envelope.error_type),
                _ => None,
            })
            .collect()
    }

    const COMPLETE_CALL: &str =
        r#"{"tool": "completeWorkflow", "args": {"workflowId": "wf-1", "completedTasks": []}}"#;

    #[tokio::test]
    async fn test_text_reply_streams_per_token() {
        let llm = Arc::new(ScriptedLlmClient::new(["Hello there friend"]));
        let h = Harness::new(llm, StubDispatcher::new(BackendDispatchResult::skipped()));
        let (summary, events, trace) = run(&h.session(), "hi").await;

        assert_eq!(summary.finish_reason, FinishReason::Stop);
        assert_eq!(summary.reply, "Hello there friend");
        let deltas: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, ["Hello ", "there ", "friend"]);
        assert!(matches!(events.first(), Some(ChatEvent::SessionStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(ChatEvent::Done {
                finish_reason: FinishReason::Stop
            })
        ));
        assert_eq!(trace.len(), 2);
    }

    #[tokio::test]
    async fn test_step_budget_halts_looping_model() {
        let llm = Arc::new(LoopingLlmClient::new(COMPLETE_CALL));
        let h = Harness::new(llm, StubDispatcher::new(BackendDispatchResult::skipped()));
        let session = h.session().with_max_steps(3);
        let (summary, events, _) = run(&session, "loop forever").await;

        assert_eq!(summary.finish_reason, FinishReason::StepLimit);
        assert_eq!(summary.steps, 3);
        let tool_calls = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ToolCall { .. }))
            .count();
        assert_eq!(tool_calls, 3);
        assert!(events
            .iter()
            .any(|e| matches!(e, ChatEvent::StepLimitReached { max_steps: 3 })));
        // 工具调用不会逐 token 转发
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::TextDelta { .. })));
    }

    #[tokio::test]
    async fn test_schema_error_reported_and_turn_continues() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "completeWorkflow", "args": {"workflowId": "wf", "completedTasks": [], "bogus": 1}}"#,
            "Done.",
        ]));
        let h = Harness::new(llm.clone(), StubDispatcher::new(BackendDispatchResult::skipped()));
        let (summary, events, _) = run(&h.session(), "finish it").await;

        assert_eq!(error_kinds(&events), vec![ErrorKind::PydanticSchema]);
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::ToolResult { .. })));
        assert_eq!(summary.finish_reason, FinishReason::Stop);
        assert_eq!(summary.reply, "Done.");
        assert!(summary.workflow.is_none());

        // 第二次调用能看到失败观察
        let second = &llm.seen_messages()[1];
        assert!(second
            .last()
            .map(|m| m.content.contains("pydantic_schema"))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_truncated_tool_call_is_schema_error() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "startWorkflow", "args": {"workflowId": "wf", "initialTasks": [{"description": "check the lead's network"}]"#,
            r#"{"tool": "startWorkflow", "args": {"workflowId": "wf""#,
            "Let me try that again later.",
        ]));
        let h = Harness::new(llm, StubDispatcher::new(BackendDispatchResult::skipped()));
        let (summary, events, _) = run(&h.session(), "check the lead").await;

        assert_eq!(
            error_kinds(&events),
            vec![ErrorKind::PydanticSchema, ErrorKind::PydanticSchema]
        );
        assert!(!events.iter().any(|e| matches!(e, ChatEvent::ToolCall { .. })));
        assert_eq!(summary.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_reply_starting_with_brace_is_text() {
        let reply = "{firstName} is the merge tag for Jane's email.";
        let llm = Arc::new(ScriptedLlmClient::new([reply]));
        let h = Harness::new(llm, StubDispatcher::new(BackendDispatchResult::skipped()));
        let (summary, events, trace) = run(&h.session(), "which merge tag?").await;

        assert_eq!(summary.finish_reason, FinishReason::Stop);
        assert_eq!(summary.reply, reply);
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, reply);
        assert!(error_kinds(&events).is_empty());
        assert_eq!(trace.messages()[1].content, reply);
    }

    #[tokio::test]
    async fn test_stalled_model_stream_times_out() {
        let llm = Arc::new(ScriptedLlmClient::with_turns([
            ScriptedTurn::Stall {
                partial: "Working on ".into(),
            },
            ScriptedTurn::Output("Here is the answer.".into()),
        ]));
        let h = Harness {
            planner: Planner::new(llm, "system").with_request_timeout(Duration::from_millis(50)),
            executor: ToolExecutor::new(
                StubDispatcher::new(BackendDispatchResult::skipped()),
                Duration::from_secs(5),
            ),
        };
        let (summary, events, trace) = run(&h.session(), "hello").await;

        assert_eq!(error_kinds(&events), vec![ErrorKind::Timeout]);
        assert_eq!(summary.finish_reason, FinishReason::Stop);
        assert_eq!(summary.reply, "Here is the answer.");
        assert_eq!(summary.steps, 2);
        assert_eq!(trace.messages()[1].content, "Working on");
    }

    #[tokio::test]
    async fn test_step_error_stops_when_not_continuing() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "deleteLead", "args": {}}"#,
            "unreachable",
        ]));
        let h = Harness::new(llm.clone(), StubDispatcher::new(BackendDispatchResult::skipped()));
        let session = h.session().with_continue_on_step_error(false);
        let (summary, events, _) = run(&session, "delete").await;

        assert_eq!(summary.finish_reason, FinishReason::Error);
        assert_eq!(llm.calls(), 1);
        assert_eq!(error_kinds(&events), vec![ErrorKind::PydanticSchema]);
    }

    #[tokio::test]
    async fn test_stream_interruption_is_classified() {
        let llm = Arc::new(ScriptedLlmClient::with_turns([
            ScriptedTurn::Interrupted {
                partial: "Let me ".into(),
                error: "connection reset".into(),
            },
            ScriptedTurn::Output("Sorry, here it is.".into()),
        ]));
        let h = Harness::new(llm, StubDispatcher::new(BackendDispatchResult::skipped()));
        let (summary, events, trace) = run(&h.session(), "hello").await;

        assert_eq!(error_kinds(&events), vec![ErrorKind::StreamProcessing]);
        assert_eq!(summary.finish_reason, FinishReason::Stop);
        assert_eq!(summary.steps, 2);
        assert_eq!(trace.messages()[1].content, "Let me");
    }

    #[tokio::test]
    async fn test_user_request_ends_turn() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "startWorkflow", "args": {"workflowId": "wf-1", "agentName": "outreach", "leadId": "lead-1", "initialTasks": [{"description": "qualify lead"}]}}"#,
            r#"{"tool": "requestUserInformation", "args": {"question": "What is the email?", "informationNeeded": ["email"], "priority": "high"}}"#,
            "never reached",
        ]));
        let dispatcher = StubDispatcher::new(BackendDispatchResult::skipped());
        let h = Harness::new(llm.clone(), dispatcher.clone());
        let (summary, events, _) = run(&h.session(), "qualify lead-1").await;

        assert_eq!(summary.finish_reason, FinishReason::AwaitingUser);
        assert_eq!(llm.calls(), 2);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 0);
        assert!(events.iter().any(|e| matches!(
            e,
            ChatEvent::UserInputRequest { request } if request.question == "What is the email?"
        )));
        assert_eq!(summary.workflow.unwrap().status, TaskStatus::NeedHelp);
    }

    #[tokio::test]
    async fn test_backend_timeout_becomes_error_event() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "startWorkflow", "args": {"workflowId": "wf-1", "agentName": "outreach", "leadId": "@janedoe", "initialTasks": [{"description": "say hello"}]}}"#,
            "The backend is slow, I'll keep tracking this here.",
        ]));
        let dispatcher = StubDispatcher::new(BackendDispatchResult::failed(
            "Request timeout after 30s",
        ));
        let h = Harness::new(llm, dispatcher.clone());
        let (summary, events, _) = run(&h.session(), "say hello to @janedoe").await;

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        let envelope = events
            .iter()
            .find_map(|e| match e {
                ChatEvent::Error { envelope, .. } => Some(envelope),
                _ => None,
            })
            .unwrap();
        assert_eq!(envelope.error_type, ErrorKind::Timeout);
        assert_eq!(envelope.fallback.action, "continue");
        assert_eq!(summary.finish_reason, FinishReason::Stop);
        let workflow = summary.workflow.unwrap();
        assert_eq!(workflow.metadata["backendAttempted"], true);
        assert_eq!(workflow.metadata["backendSuccess"], false);
    }

    #[tokio::test]
    async fn test_agent_reply_is_relayed_as_text_result() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "startWorkflow", "args": {"workflowId": "wf-1", "agentName": "outreach", "leadId": "jane", "initialTasks": [], "leadData": {"twitter_username": "janedoe"}}}"#,
            "Hi Jane, great to meet you!",
        ]));
        let dispatcher = StubDispatcher::new(BackendDispatchResult::succeeded(
            serde_json::json!({"data": {"result": "Hi Jane, great to meet you!"}}),
        ));
        let h = Harness::new(llm, dispatcher);
        let (_, events, _) = run(&h.session(), "contact jane").await;

        let relayed = events.iter().any(|e| matches!(
            e,
            ChatEvent::ToolResult { result: ToolResult::Text(t), .. } if t.contains("Hi Jane, great to meet you!")
        ));
        assert!(relayed);
        assert!(events.iter().any(|e| matches!(e, ChatEvent::WorkflowUpdate { .. })));
        assert!(error_kinds(&events).is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_client_stops_before_first_step() {
        let llm = Arc::new(ScriptedLlmClient::new(["hello"]));
        let h = Harness::new(llm.clone(), StubDispatcher::new(BackendDispatchResult::skipped()));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut trace = ConversationTrace::from_messages([Message::user("hi")]);
        let summary = run_chat_turn(&h.session(), &mut trace, &tx).await;

        assert_eq!(summary.finish_reason, FinishReason::Disconnected);
        assert_eq!(summary.steps, 0);
        assert_eq!(llm.calls(), 0);
    }
}
