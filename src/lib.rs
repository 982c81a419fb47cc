//! CRM Bridge - 对话式工作流编排桥接服务
//!
//! 模块划分：
//! - **agent**: 运行时组件装配（Planner + ToolExecutor + 对话配置）
//! - **backend**: 后端调度判定、编排服务 HTTP 网关、线索结构
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、错误分类与恢复信封
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 单次请求内的对话轨迹
//! - **observability**: 日志初始化
//! - **react**: Planner、流事件、流式对话主循环
//! - **tools**: 五个工作流工具、注册表与执行器
//! - **web**: HTTP 接口（/api/chat NDJSON 流）
//! - **workflow**: 工作流状态与状态追踪器

pub mod agent;
pub mod backend;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod web;
pub mod workflow;
