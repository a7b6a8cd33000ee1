//! `POST /publish`: lets out-of-process services fire events through the
//! dispatcher.
//!
//! ```text
//! POST /publish
//! x-publish-key: <key>
//! {"target": {"kind": "tenant", "id": "school-42"}, "event": "fee:paid", "data": {...}}
//! → 200 {"delivered": 3}
//! ```

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use campus_core::Role;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::metrics::HUB_PUBLISH_REQUESTS_TOTAL;
use crate::server::AppState;
use crate::websocket::dispatcher::Dispatcher;

/// Header carrying the shared publish key.
pub const PUBLISH_KEY_HEADER: &str = "x-publish-key";

/// Request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    /// Who receives the event.
    pub target: PublishTarget,
    /// Event tag, e.g. `attendance:marked`.
    pub event: String,
    /// Event body.
    #[serde(default)]
    pub data: Value,
}

/// Fan-out target, mirroring the dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PublishTarget {
    /// `send_to_user`
    User {
        /// Subject ID.
        id: String,
    },
    /// `send_to_tenant`
    Tenant {
        /// Tenant ID.
        id: String,
    },
    /// `send_to_role`
    Role {
        /// Role name, e.g. `teacher`.
        id: String,
    },
    /// `send_to_room`
    Room {
        /// Ad-hoc room name.
        id: String,
    },
    /// `broadcast_all`
    All,
}

impl PublishTarget {
    /// Run the matching dispatcher operation.
    pub fn dispatch(&self, dispatcher: &Dispatcher, event: &str, data: Value) -> Result<usize, PublishError> {
        let delivered = match self {
            Self::User { id } => dispatcher.send_to_user(non_empty(id)?, event, data),
            Self::Tenant { id } => dispatcher.send_to_tenant(non_empty(id)?, event, data),
            Self::Role { id } => {
                let role: Role = id
                    .parse()
                    .map_err(|e| PublishError::BadRequest(format!("{e}")))?;
                dispatcher.send_to_role(role, event, data)
            }
            Self::Room { id } => dispatcher.send_to_room(non_empty(id)?, event, data),
            Self::All => dispatcher.broadcast_all(event, data),
        };
        Ok(delivered)
    }
}

fn non_empty(id: &str) -> Result<&str, PublishError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(PublishError::BadRequest("target id is empty".into()));
    }
    Ok(id)
}

/// Response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Connections that accepted the frame.
    pub delivered: usize,
}

/// Publish endpoint failures.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No publish key configured.
    #[error("publishing is disabled")]
    Disabled,
    /// Key header absent or wrong.
    #[error("missing or invalid publish key")]
    Unauthorized,
    /// Body could not be understood.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl PublishError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Disabled => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn authorize(expected: Option<&str>, headers: &HeaderMap) -> Result<(), PublishError> {
    let expected = expected.ok_or(PublishError::Disabled)?;
    let presented = headers
        .get(PUBLISH_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(PublishError::Unauthorized)?;
    if !keys_match(presented, expected) {
        return Err(PublishError::Unauthorized);
    }
    Ok(())
}

/// Constant-time key comparison. Only the length can leak.
fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// POST /publish
pub async fn publish_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, PublishError> {
    let result = publish(&state, &headers, body);
    let status = match &result {
        Ok(_) => "ok",
        Err(PublishError::Disabled) => "disabled",
        Err(PublishError::Unauthorized) => "unauthorized",
        Err(PublishError::BadRequest(_)) => "bad_request",
    };
    counter!(HUB_PUBLISH_REQUESTS_TOTAL, "status" => status).increment(1);
    result.map(Json)
}

fn publish(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<PublishResponse, PublishError> {
    authorize(state.config.publish_key.as_deref(), headers)?;
    let Json(request) = body.map_err(|e| PublishError::BadRequest(e.body_text()))?;
    if request.event.trim().is_empty() {
        return Err(PublishError::BadRequest("event is empty".into()));
    }
    debug!(kind = ?request.target, event = %request.event, "publish request");
    let delivered = request
        .target
        .dispatch(&state.dispatcher, &request.event, request.data)?;
    info!(event = %request.event, delivered, "published");
    Ok(PublishResponse { delivered })
}
