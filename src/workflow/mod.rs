//! 工作流：任务 / 状态类型与单次对话内的状态追踪器

pub mod tracker;
pub mod types;

pub use tracker::{TransitionWarning, WorkflowTracker};
pub use types::*;
