//! 工作流类型定义
//!
//! WorkflowTask / WorkflowState 即对话中模型声明、客户端展示的工作流快照；
//! 字段名与前端约定一致（camelCase，状态为 kebab-case）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type WorkflowId = String;
pub type TaskId = String;

/// 任务 / 工作流状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    /// 等待用户补充信息或决策，非终态
    NeedHelp,
}

impl TaskStatus {
    /// completed / failed 为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::NeedHelp => "need-help",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// 工作流中的单个任务；只会被状态迁移，不会被删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowTask {
    /// 省略时按顺序生成 task-1、task-2 ...
    #[serde(default)]
    pub id: TaskId,
    /// 省略时取 description
    #[serde(default)]
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// 该任务预计使用的工具名（有序）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl WorkflowTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            tools: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// 单次对话内的工作流快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub current_agent: String,
    pub current_step: String,
    /// 0-100
    #[schemars(range(min = 0, max = 100))]
    pub progress: u8,
    pub status: TaskStatus,
    /// 展示顺序，更新时保持
    pub tasks: Vec<WorkflowTask>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowState {
    /// 新建工作流：status 为 in-progress，progress 为 0；任务缺省的 id / title 按顺序补齐
    pub fn new(
        workflow_id: impl Into<String>,
        current_agent: impl Into<String>,
        tasks: Vec<WorkflowTask>,
    ) -> Self {
        let tasks = tasks
            .into_iter()
            .enumerate()
            .map(|(i, mut t)| {
                if t.id.trim().is_empty() {
                    t.id = format!("task-{}", i + 1);
                }
                if t.title.trim().is_empty() {
                    t.title = t.description.clone();
                }
                t
            })
            .collect::<Vec<_>>();
        let current_step = tasks
            .first()
            .map(|t| t.title.clone())
            .unwrap_or_else(|| "initializing".to_string());
        Self {
            workflow_id: workflow_id.into(),
            current_agent: current_agent.into(),
            current_step,
            progress: 0,
            status: TaskStatus::InProgress,
            tasks,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&WorkflowTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
