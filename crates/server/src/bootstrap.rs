use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use minion_agent::{AgentRuntime, RuntimeBuildError};
use minion_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::{chat, health};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

impl Application {
    pub fn router(&self) -> Router {
        chat::router(Arc::clone(&self.runtime)).merge(health::router(Arc::clone(&self.runtime)))
    }

    /// Periodically evicts sessions idle past `server.session_idle_secs`. Disabled at zero.
    pub fn spawn_session_sweeper(&self) -> Option<JoinHandle<()>> {
        let idle_secs = self.config.server.session_idle_secs;
        if idle_secs == 0 {
            return None;
        }

        let max_idle = Duration::from_secs(idle_secs);
        let period = Duration::from_secs((idle_secs / 2).clamp(1, 60));
        let runtime = Arc::clone(&self.runtime);
        info!(
            event_name = "system.session_sweeper.started",
            correlation_id = "bootstrap",
            idle_secs,
            period_secs = period.as_secs(),
            "idle session sweeper running"
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                runtime.sessions().evict_idle(max_idle).await;
            }
        }))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime construction failed: {0}")]
    Runtime(#[from] RuntimeBuildError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        agents = config.agents.len(),
        "starting application bootstrap"
    );

    let runtime = Arc::new(AgentRuntime::from_config(&config)?);

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        fallback = %runtime.registry().fallback().id(),
        "agent runtime initialized"
    );

    Ok(Application { config, runtime })
}
