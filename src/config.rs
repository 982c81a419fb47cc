//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BRIDGE__*` 覆盖（双下划线表示嵌套，如 `BRIDGE__BACKEND__BASE_URL=http://crm:8000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub backend: BackendSection,
    pub chat: ChatSection,
}

/// [app] 段：应用名与监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub bind_addr: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// deepseek / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读 DEEPSEEK_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    /// 建立流与等待每个 token 的超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 秒
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [backend] 段：编排后端地址与单次调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// [chat] 段：步数上限、单步失败是否继续、流版本号、工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub max_steps: usize,
    pub continue_on_step_error: bool,
    pub stream_version: String,
    /// 单次工具执行（含后端调用）超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_steps: 5,
            continue_on_step_error: true,
            stream_version: "2".to_string(),
            tool_timeout_secs: 45,
        }
    }
}

impl ChatSection {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// 从 config 目录加载配置，环境变量 BRIDGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BRIDGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
