//! 记忆层：单次请求内的对话轨迹

pub mod conversation;

pub use conversation::{ConversationTrace, Message, Role};
