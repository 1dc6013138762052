use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use minion_core::{normalize_label, AgentId, ConfigurationError};

use crate::llm::CompletionService;

/// One specialized responder: persona text plus the completion backend that speaks it.
#[derive(Clone)]
pub struct AgentProfile {
    id: AgentId,
    labels: Vec<String>,
    routing_rule: String,
    persona: String,
    completion: Arc<dyn CompletionService>,
}

impl AgentProfile {
    pub fn new(
        id: AgentId,
        persona: impl Into<String>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let labels = vec![id.as_str().to_string()];
        Self { id, labels, routing_rule: String::new(), persona: persona.into(), completion }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_routing_rule(mut self, routing_rule: impl Into<String>) -> Self {
        self.routing_rule = routing_rule.into();
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn routing_rule(&self) -> &str {
        &self.routing_rule
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    pub fn completion(&self) -> &dyn CompletionService {
        self.completion.as_ref()
    }
}

impl fmt::Debug for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentProfile")
            .field("id", &self.id)
            .field("labels", &self.labels)
            .field("routing_rule", &self.routing_rule)
            .field("persona", &self.persona)
            .field("model", &self.completion.model())
            .finish()
    }
}

// Completion handles are shared infrastructure, not part of a profile's identity.
impl PartialEq for AgentProfile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.labels == other.labels
            && self.routing_rule == other.routing_rule
            && self.persona == other.persona
    }
}

impl Eq for AgentProfile {}

/// Immutable label → profile lookup with a guaranteed fallback.
#[derive(Debug, PartialEq, Eq)]
pub struct AgentRegistry {
    profiles: Vec<Arc<AgentProfile>>,
    labels: BTreeMap<String, usize>,
    fallback: usize,
}

impl AgentRegistry {
    pub fn build(
        profiles: Vec<AgentProfile>,
        fallback: &AgentId,
    ) -> Result<Self, ConfigurationError> {
        if profiles.is_empty() {
            return Err(ConfigurationError::NoProfiles);
        }

        let mut labels: BTreeMap<String, usize> = BTreeMap::new();
        for (index, profile) in profiles.iter().enumerate() {
            if profiles[..index].iter().any(|earlier| earlier.id == profile.id) {
                return Err(ConfigurationError::DuplicateIdentifier(profile.id.clone()));
            }
            if profile.persona.trim().is_empty() {
                return Err(ConfigurationError::EmptyPersona(profile.id.clone()));
            }

            for raw in &profile.labels {
                let label = normalize_label(raw);
                if label.is_empty() {
                    return Err(ConfigurationError::EmptyLabel(profile.id.clone()));
                }
                match labels.get(&label) {
                    Some(&owner) if owner != index => {
                        return Err(ConfigurationError::DuplicateLabel {
                            label,
                            first: profiles[owner].id.clone(),
                            second: profile.id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        labels.insert(label, index);
                    }
                }
            }
        }

        let fallback = profiles
            .iter()
            .position(|profile| &profile.id == fallback)
            .ok_or_else(|| ConfigurationError::UnknownFallback(fallback.clone()))?;

        Ok(Self { profiles: profiles.into_iter().map(Arc::new).collect(), labels, fallback })
    }

    pub fn fallback(&self) -> &Arc<AgentProfile> {
        &self.profiles[self.fallback]
    }

    /// Exact lookup of an already-normalized classifier label.
    pub fn by_label(&self, label: &str) -> Option<&Arc<AgentProfile>> {
        self.labels.get(label).map(|&index| &self.profiles[index])
    }

    pub fn get(&self, id: &AgentId) -> Option<&Arc<AgentProfile>> {
        self.profiles.iter().find(|profile| &profile.id == id)
    }

    /// Resolves to the fallback profile for identifiers the registry does not know.
    pub fn resolve(&self, id: &AgentId) -> &Arc<AgentProfile> {
        self.get(id).unwrap_or_else(|| self.fallback())
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<AgentProfile>> {
        self.profiles.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
