//! 后端编排服务：调度判定、HTTP 网关、请求 / 响应结构

pub mod classifier;
pub mod gateway;
pub mod types;

pub use classifier::{DispatchClassifier, DispatchDecision, DispatchReason};
pub use gateway::{BackendGateway, LeadDispatcher, LEAD_WORKFLOW_PATH};
pub use types::{BackendDispatchResult, LeadData, LeadRecord};
