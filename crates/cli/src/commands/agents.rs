use minion_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

/// Lists the configured agent roster. Reads local configuration only.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("agents", "config_validation", error.to_string(), 2)
        }
    };

    let mut lines = vec![format!("{} agents configured:", config.agents.len())];
    for agent in &config.agents {
        let marker = if agent.id.trim() == config.routing.fallback.trim() { " (fallback)" } else { "" };
        lines.push(format!(
            "- {}{marker}: labels [{}]; {}",
            agent.id,
            agent.effective_labels().join(", "),
            agent.routing_rule
        ));
    }

    CommandResult::success("agents", lines.join("\n"))
}
