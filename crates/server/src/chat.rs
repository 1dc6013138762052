//! JSON API over the agent runtime.
//!
//! - `POST   /chat`           route a question and return the agent's reply
//! - `GET    /sessions/{id}`  conversation turns for one session
//! - `DELETE /sessions/{id}`  clear a session's history
//! - `GET    /agents`         registered agents and the fallback

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use minion_agent::AgentRuntime;
use minion_core::{ApplicationError, InterfaceError, SessionId, Turn};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub userquestion: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    pub agent: String,
    pub session_id: String,
    pub routed_by: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSummary {
    pub id: String,
    pub labels: Vec<String>,
    pub routing_rule: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentsResponse {
    pub fallback: String,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions/{id}", get(session_history).delete(reset_session))
        .route("/agents", get(list_agents))
        .with_state(ChatState { runtime })
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let session_id = match request.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => SessionId::from(id),
        _ => SessionId::generate(),
    };

    info!(
        event_name = "api.chat.received",
        correlation_id = %correlation_id,
        session_id = %session_id,
        "chat request received"
    );

    let reply = state
        .runtime
        .handle_utterance(&session_id, &request.userquestion)
        .await
        .map_err(|error| api_error(error, &correlation_id))?;

    Ok(Json(ChatResponse {
        response: reply.text,
        agent: reply.agent.to_string(),
        session_id: reply.session_id.to_string(),
        routed_by: reply.decision.routed_by().to_string(),
    }))
}

pub async fn session_history(
    Path(id): Path<String>,
    State(state): State<ChatState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = SessionId::from(id.as_str());
    match state.runtime.sessions().snapshot(&session_id).await {
        Some(conversation) => Ok(Json(SessionResponse {
            session_id: session_id.to_string(),
            turns: conversation.turns().to_vec(),
        })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("session `{session_id}` not found"),
                correlation_id: Uuid::new_v4().to_string(),
            }),
        )),
    }
}

pub async fn reset_session(Path(id): Path<String>, State(state): State<ChatState>) -> StatusCode {
    let session_id = SessionId::from(id.as_str());
    let existed = state.runtime.sessions().reset(&session_id).await;
    info!(
        event_name = "api.session.reset",
        session_id = %session_id,
        existed,
        "session reset requested"
    );
    StatusCode::NO_CONTENT
}

pub async fn list_agents(State(state): State<ChatState>) -> Json<AgentsResponse> {
    let registry = state.runtime.registry();
    Json(AgentsResponse {
        fallback: registry.fallback().id().to_string(),
        agents: registry
            .profiles()
            .map(|profile| AgentSummary {
                id: profile.id().to_string(),
                labels: profile.labels().to_vec(),
                routing_rule: profile.routing_rule().to_string(),
            })
            .collect(),
    })
}

fn api_error(error: ApplicationError, correlation_id: &str) -> ApiError {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "api.chat.rejected",
        correlation_id = %correlation_id,
        status = status.as_u16(),
        error = %interface,
        "chat request failed"
    );

    let error = match &interface {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        _ => interface.user_message().to_string(),
    };
    (status, Json(ErrorBody { error, correlation_id: interface.correlation_id().to_string() }))
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::{Path, State},
        http::{Method, Request, StatusCode},
        Json,
    };
    use minion_core::Role;
    use tower::ServiceExt;

    use super::testing::runtime;
    use super::{
        chat, list_agents, router, AgentsResponse, ChatRequest, ChatResponse, ChatState,
        ErrorBody, SessionResponse,
    };

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn read_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = to_bytes(body, usize::MAX).await.expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn chat_routes_question_and_reports_agent() {
        let state = ChatState { runtime: runtime(&["cat"], &["Siamese cats are chatty."]) };

        let Json(response) = chat(
            State(state),
            Json(ChatRequest {
                userquestion: "Tell me about Siamese cats".to_string(),
                session_id: Some("s-1".to_string()),
            }),
        )
        .await
        .expect("chat should succeed");

        assert_eq!(
            response,
            ChatResponse {
                response: "Siamese cats are chatty.".to_string(),
                agent: "cat".to_string(),
                session_id: "s-1".to_string(),
                routed_by: "classifier".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn chat_allocates_session_when_missing() {
        let state = ChatState { runtime: runtime(&["nonsense"], &["How can I help?"]) };

        let Json(response) = chat(
            State(state),
            Json(ChatRequest { userquestion: "asdkjasd".to_string(), session_id: None }),
        )
        .await
        .expect("chat should succeed");

        assert!(response.session_id.starts_with("session-"));
        assert_eq!(response.agent, "receptionist");
        assert_eq!(response.routed_by, "fallback");
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let state = ChatState { runtime: runtime(&[], &[]) };

        let result = chat(
            State(state),
            Json(ChatRequest { userquestion: "   ".to_string(), session_id: None }),
        )
        .await;

        let (status, Json(body)) = result.expect_err("empty question should fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "utterance text must not be empty");
        assert!(!body.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_still_returns_reply_text() {
        let state = ChatState { runtime: runtime(&["dog"], &[]) };

        let Json(response) = chat(
            State(state),
            Json(ChatRequest { userquestion: "Do beagles shed?".to_string(), session_id: None }),
        )
        .await
        .expect("chat should succeed");

        assert_eq!(response.response, "I apologize, but I encountered an error. Can we try again?");
        assert_eq!(response.agent, "dog");
    }

    #[tokio::test]
    async fn agents_listing_names_fallback() {
        let state = ChatState { runtime: runtime(&[], &[]) };

        let Json(AgentsResponse { fallback, agents }) = list_agents(State(state)).await;

        assert_eq!(fallback, "receptionist");
        let ids = agents.iter().map(|agent| agent.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["cat", "dog", "receptionist"]);
        assert_eq!(agents[0].routing_rule, "handles all queries related to cats");
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let runtime = runtime(&["cat", "dog"], &["Meow.", "Woof."]);
        let app = router(Arc::clone(&runtime));

        for question in ["cats?", "dogs?"] {
            let response = app
                .clone()
                .oneshot(json_request(
                    Method::POST,
                    "/chat",
                    &format!(r#"{{"userquestion":"{question}","session_id":"web-1"}}"#),
                ))
                .await
                .expect("chat response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(json_request(Method::GET, "/sessions/web-1", ""))
            .await
            .expect("history response");
        assert_eq!(response.status(), StatusCode::OK);
        let history: SessionResponse = read_json(response.into_body()).await;
        let roles = history.turns.iter().map(|turn| turn.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(history.turns[3].text, "Woof.");

        let response = app
            .clone()
            .oneshot(json_request(Method::DELETE, "/sessions/web-1", ""))
            .await
            .expect("reset response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(json_request(Method::GET, "/sessions/web-1", ""))
            .await
            .expect("history response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(runtime.sessions().is_empty().await);

        let response = app
            .oneshot(json_request(Method::DELETE, "/sessions/web-1", ""))
            .await
            .expect("second reset response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = ChatState { runtime: runtime(&[], &[]) };

        let result = super::session_history(Path("missing".to_string()), State(state)).await;

        let (status, Json(ErrorBody { error, .. })) = result.expect_err("unknown session");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(error.contains("missing"));
    }
}
