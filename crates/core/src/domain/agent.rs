use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercased, whitespace-trimmed form used for classifier labels on both sides of the
/// comparison.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_label, AgentId};

    #[test]
    fn normalize_label_trims_and_lowercases() {
        assert_eq!(normalize_label("  Cat\n"), "cat");
        assert_eq!(normalize_label("Email Manager"), "email manager");
        assert_eq!(normalize_label("   "), "");
    }

    #[test]
    fn agent_id_displays_raw_value() {
        assert_eq!(AgentId::new("receptionist").to_string(), "receptionist");
    }
}
