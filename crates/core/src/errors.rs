use thiserror::Error;

use crate::domain::agent::AgentId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("utterance text must not be empty")]
    EmptyUtterance,
    #[error("the previous user turn has not been answered yet")]
    ReplyPending,
    #[error("conversation has no pending user turn to answer")]
    NoPendingUserTurn,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Malformed agent setup detected at startup. Always fatal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("agent registry needs at least one profile")]
    NoProfiles,
    #[error("agent identifier `{0}` is registered more than once")]
    DuplicateIdentifier(AgentId),
    #[error("fallback agent `{0}` does not match any registered profile")]
    UnknownFallback(AgentId),
    #[error("classification label `{label}` is claimed by both `{first}` and `{second}`")]
    DuplicateLabel { label: String, first: AgentId, second: AgentId },
    #[error("agent `{0}` declares an empty classification label")]
    EmptyLabel(AgentId),
    #[error("agent `{0}` has an empty persona instruction")]
    EmptyPersona(AgentId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The request could not be processed. Check inputs and try again.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::InvalidInput(message) => Self::BadRequest { message, correlation_id },
            ApplicationError::Domain(DomainError::EmptyUtterance) => Self::BadRequest {
                message: DomainError::EmptyUtterance.to_string(),
                correlation_id,
            },
            ApplicationError::Domain(DomainError::ReplyPending) => Self::ServiceUnavailable {
                message: DomainError::ReplyPending.to_string(),
                correlation_id,
            },
            ApplicationError::Domain(error) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(error) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
        }
    }
}
