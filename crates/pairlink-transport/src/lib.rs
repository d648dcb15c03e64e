//! HTTP control surface for the paired session.
//!
//! Provides:
//! - Wire types for requests and error bodies
//! - `control_router` - Axum routes over the state machine and dispatcher
//! - Status event stream (feature: sse)

pub mod protocol;
pub mod routes;

pub use protocol::{BroadcastRequest, ErrorBody, LogoutResponse, SendRequest, SendResponse};
pub use routes::{ControlState, control_router};
