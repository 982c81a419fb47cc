//! 核心层：错误类型与错误分类 / 恢复信封

pub mod error;
pub mod recovery;

pub use error::BridgeError;
pub use recovery::{ClassifiedError, ErrorClassifier, ErrorEnvelope, ErrorKind, Fallback};
