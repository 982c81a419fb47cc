//! CRM Bridge 服务入口
//!
//! 初始化日志、加载配置、构建组件，启动 HTTP 服务。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use crm_bridge::agent::create_agent_components;
use crm_bridge::config::{load_config, AppConfig};
use crm_bridge::web::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crm_bridge::observability::init();

    // 可选：第一个参数为额外的配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let components =
        create_agent_components(&cfg).context("Failed to create agent components")?;
    let app = create_router(Arc::new(AppState::new(components)));

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.app.bind_addr))?;
    tracing::info!(
        "{} listening on http://{}",
        cfg.app.name.as_deref().unwrap_or("crm-bridge"),
        cfg.app.bind_addr
    );
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
