//! 工作流状态追踪
//!
//! 状态：pending / in-progress / completed / failed / need-help。
//! 模型对状态拥有完全决定权：updateWorkflow 的任何组合都会被接受，
//! 但进度回退、离开终态、跳过 in-progress 等情况会以 warn 记录并返回给调用方。

use std::fmt;

use crate::workflow::{TaskStatus, WorkflowState};

/// 非致命的迁移告警
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionWarning {
    /// 进度回退
    ProgressRegressed { from: u8, to: u8 },
    /// 进度超过 100，已截断
    ProgressClamped { requested: u8 },
    /// 从终态再次变化
    LeftTerminalState { from: TaskStatus, to: TaskStatus },
    /// pending 直接跳到 completed
    SkippedInProgress,
    /// progress == 100 与 status == completed 不一致
    ProgressStatusMismatch { progress: u8, status: TaskStatus },
    /// 更新中丢失了已有任务
    TaskDropped { task_id: String },
    /// 工作流 id 与当前不同
    WorkflowIdChanged { from: String, to: String },
}

impl fmt::Display for TransitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionWarning::ProgressRegressed { from, to } => {
                write!(f, "progress regressed from {from} to {to}")
            }
            TransitionWarning::ProgressClamped { requested } => {
                write!(f, "progress {requested} clamped to 100")
            }
            TransitionWarning::LeftTerminalState { from, to } => {
                write!(f, "status left terminal state {} for {}", from.as_str(), to.as_str())
            }
            TransitionWarning::SkippedInProgress => {
                write!(f, "status jumped from pending to completed")
            }
            TransitionWarning::ProgressStatusMismatch { progress, status } => {
                write!(f, "progress {progress} inconsistent with status {}", status.as_str())
            }
            TransitionWarning::TaskDropped { task_id } => write!(f, "task {task_id} was dropped"),
            TransitionWarning::WorkflowIdChanged { from, to } => {
                write!(f, "workflow id changed from {from} to {to}")
            }
        }
    }
}

/// 单次对话内的工作流追踪器（不跨请求持久化）
#[derive(Debug, Default, Clone)]
pub struct WorkflowTracker {
    state: Option<WorkflowState>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&WorkflowState> {
        self.state.as_ref()
    }

    /// startWorkflow：以声明的状态作为初始状态（可以是任意状态）
    pub fn start(&mut self, state: WorkflowState) -> &WorkflowState {
        tracing::info!(
            workflow_id = %state.workflow_id,
            agent = %state.current_agent,
            tasks = state.tasks.len(),
            "workflow started"
        );
        self.state.insert(state)
    }

    /// updateWorkflow：整体替换，返回检测到的告警
    pub fn apply_update(&mut self, mut next: WorkflowState) -> Vec<TransitionWarning> {
        let mut warnings = Vec::new();
        if next.progress > 100 {
            warnings.push(TransitionWarning::ProgressClamped {
                requested: next.progress,
            });
            next.progress = 100;
        }
        if let Some(prev) = &self.state {
            warnings.extend(diff_states(prev, &next));
        }
        if (next.progress == 100) != (next.status == TaskStatus::Completed) {
            warnings.push(TransitionWarning::ProgressStatusMismatch {
                progress: next.progress,
                status: next.status,
            });
        }
        for w in &warnings {
            tracing::warn!(workflow_id = %next.workflow_id, "workflow update: {}", w);
        }
        self.state = Some(next);
        warnings
    }

    /// completeWorkflow：强制 completed / 100，写入完成时间；completed_tasks 中的任务标记为完成。
    /// workflowId 与当前不同时保留已有任务，只记告警
    pub fn complete(
        &mut self,
        workflow_id: &str,
        completed_tasks: &[String],
        final_results: Option<serde_json::Value>,
    ) -> (&WorkflowState, Vec<TransitionWarning>) {
        let mut warnings = Vec::new();
        let mut state = match self.state.take() {
            Some(mut s) => {
                if s.workflow_id != workflow_id {
                    let warning = TransitionWarning::WorkflowIdChanged {
                        from: std::mem::replace(&mut s.workflow_id, workflow_id.to_string()),
                        to: workflow_id.to_string(),
                    };
                    tracing::warn!(workflow_id = %workflow_id, "workflow complete: {}", warning);
                    warnings.push(warning);
                }
                s
            }
            None => WorkflowState::new(workflow_id, "", Vec::new()),
        };
        for task in state.tasks.iter_mut() {
            if completed_tasks.iter().any(|id| id == &task.id) {
                task.status = TaskStatus::Completed;
            }
        }
        state.status = TaskStatus::Completed;
        state.progress = 100;
        state.current_step = "completed".to_string();
        state.metadata.insert(
            "completedAt".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
        state.metadata.insert(
            "completedTasks".to_string(),
            serde_json::Value::from(completed_tasks.to_vec()),
        );
        if let Some(results) = final_results {
            state.metadata.insert("finalResults".to_string(), results);
        }
        tracing::info!(workflow_id = %state.workflow_id, "workflow completed");
        (self.state.insert(state), warnings)
    }

    /// 请求用户输入 / 决策：挂起为 need-help；终态或尚无工作流时不变
    pub fn mark_need_help(&mut self, reason: &str) -> Option<&WorkflowState> {
        let state = self.state.as_mut()?;
        if state.status.is_terminal() {
            return Some(&*state);
        }
        state.status = TaskStatus::NeedHelp;
        state.metadata.insert(
            "pendingRequest".to_string(),
            serde_json::Value::String(reason.to_string()),
        );
        Some(&*state)
    }
}

fn diff_states(prev: &WorkflowState, next: &WorkflowState) -> Vec<TransitionWarning> {
    let mut warnings = Vec::new();
    if prev.workflow_id != next.workflow_id {
        warnings.push(TransitionWarning::WorkflowIdChanged {
            from: prev.workflow_id.clone(),
            to: next.workflow_id.clone(),
        });
    }
    if next.progress < prev.progress {
        warnings.push(TransitionWarning::ProgressRegressed {
            from: prev.progress,
            to: next.progress,
        });
    }
    if prev.status.is_terminal() && next.status != prev.status {
        warnings.push(TransitionWarning::LeftTerminalState {
            from: prev.status,
            to: next.status,
        });
    }
    if prev.status == TaskStatus::Pending && next.status == TaskStatus::Completed {
        warnings.push(TransitionWarning::SkippedInProgress);
    }
    for task in &prev.tasks {
        if next.task(&task.id).is_none() {
            warnings.push(TransitionWarning::TaskDropped {
                task_id: task.id.clone(),
            });
        }
    }
    warnings
}
