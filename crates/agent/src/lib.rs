//! Routing core for minion.
//!
//! One utterance flows through a fixed two-step pipeline:
//! 1. **Routing** (`router`) - a stateless classifier call maps the text onto an agent label;
//!    anything unrecognized resolves to the registry's fallback agent.
//! 2. **Invocation** (`invoker`) - the chosen agent's persona, the session history, and the
//!    new user turn go to the completion backend; failures become fixed reply texts.
//!
//! `AgentRuntime` ties both steps to the per-session `SessionStore` and is the only entry
//! point callers need.

pub mod invoker;
pub mod llm;
pub mod providers;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod session;

pub use invoker::{AgentInvoker, Invocation, InvocationOutcome};
pub use llm::{ChatMessage, CompletionError, CompletionRequest, CompletionService, MessageRole};
pub use providers::CompletionPool;
pub use registry::{AgentProfile, AgentRegistry};
pub use router::{FallbackReason, Router, RoutingDecision};
pub use runtime::{AgentRuntime, Reply, RuntimeBuildError};
pub use session::SessionStore;
