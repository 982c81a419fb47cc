//! 对话层：Planner、流事件、system 提示词、流式对话主循环

pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompt;

pub use events::{ChatEvent, FinishReason};
pub use loop_::{run_chat_turn, ChatSession, TurnSummary, DEFAULT_MAX_STEPS};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
pub use prompt::build_system_prompt;
