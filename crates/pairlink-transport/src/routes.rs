//! Axum routes translating HTTP calls into session commands and queries.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use pairlink_core::SessionSnapshot;
use pairlink_session::{BroadcastDispatcher, BroadcastReport, ConnectionStateMachine, DispatchError};
use tower_http::trace::TraceLayer;

use crate::protocol::{
    BroadcastRequest, ErrorBody, ErrorDetail, LogoutResponse, SendRequest, SendResponse,
};

/// Handler state: the session and its dispatcher.
#[derive(Clone)]
pub struct ControlState {
    /// Session lifecycle.
    pub machine: ConnectionStateMachine,
    /// Message dispatch.
    pub dispatcher: BroadcastDispatcher,
}

impl ControlState {
    /// Create handler state.
    #[must_use]
    pub const fn new(machine: ConnectionStateMachine, dispatcher: BroadcastDispatcher) -> Self {
        Self {
            machine,
            dispatcher,
        }
    }
}

/// API error, rendered with the session snapshot attached.
#[derive(Debug)]
struct ApiError {
    code: StatusCode,
    kind: &'static str,
    message: String,
    session: SessionSnapshot,
}

impl ApiError {
    fn invalid_input(message: impl Into<String>, session: SessionSnapshot) -> Self {
        Self {
            code: StatusCode::BAD_REQUEST,
            kind: "invalid_input",
            message: message.into(),
            session,
        }
    }

    fn from_dispatch(e: &DispatchError, session: SessionSnapshot) -> Self {
        let (code, kind) = match e {
            DispatchError::NotConnected(_) => (StatusCode::CONFLICT, "not_connected"),
            DispatchError::Validation(_) | DispatchError::InvalidRecipient(_) => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            DispatchError::SendFailed { .. } => (StatusCode::BAD_GATEWAY, "send_failed"),
        };
        if code.is_server_error() {
            tracing::warn!(kind, "request failed: {e}");
        } else {
            tracing::debug!(kind, "request rejected: {e}");
        }
        Self {
            code,
            kind,
            message: e.to_string(),
            session,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind.to_string(),
                message: self.message,
            },
            session: self.session,
        };
        (self.code, Json(body)).into_response()
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn start_handler(State(state): State<ControlState>) -> Json<SessionSnapshot> {
    Json(state.machine.start().await)
}

async fn status_handler(State(state): State<ControlState>) -> Json<SessionSnapshot> {
    Json(state.machine.status())
}

async fn logout_handler(State(state): State<ControlState>) -> Json<LogoutResponse> {
    let snapshot = state.machine.logout().await;
    Json(LogoutResponse {
        status: snapshot.status,
    })
}

async fn send_handler(
    State(state): State<ControlState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::invalid_input(e.body_text(), state.machine.status()))?;
    let recipient = req.recipient.unwrap_or_default();
    let message = req.message.unwrap_or_default();

    match state.dispatcher.send_one(&recipient, &message).await {
        Ok(to) => Ok(Json(SendResponse {
            success: true,
            recipient: to.to_string(),
        })),
        Err(e) => Err(ApiError::from_dispatch(&e, state.machine.status())),
    }
}

async fn broadcast_handler(
    State(state): State<ControlState>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<BroadcastReport>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::invalid_input(e.body_text(), state.machine.status()))?;
    let recipients = req.recipients.unwrap_or_default();
    let message = req.message.unwrap_or_default();

    state
        .dispatcher
        .broadcast(&recipients, &message)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_dispatch(&e, state.machine.status()))
}

#[cfg(feature = "sse")]
async fn events_handler(
    State(state): State<ControlState>,
) -> axum::response::Sse<
    impl futures::Stream<Item = Result<axum::response::sse::Event, axum::Error>>,
> {
    use axum::response::sse::{Event, KeepAlive, Sse};
    use futures::StreamExt;
    use tokio_stream::wrappers::WatchStream;

    let stream = WatchStream::new(state.machine.subscribe())
        .map(|snapshot| Event::default().event("status").json_data(&snapshot));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Create the control router.
///
/// # Example
/// ```ignore
/// let app = control_router(ControlState::new(machine, dispatcher));
/// axum::serve(listener, app).await?;
/// ```
pub fn control_router(state: ControlState) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/session/start", post(start_handler))
        .route("/session/status", get(status_handler))
        .route("/session/logout", post(logout_handler))
        .route("/messages/send", post(send_handler))
        .route("/messages/broadcast", post(broadcast_handler));

    #[cfg(feature = "sse")]
    let router = router.route("/session/events", get(events_handler));

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
