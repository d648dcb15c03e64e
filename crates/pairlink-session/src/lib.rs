//! Session lifecycle and dispatch for a single paired messaging account.
//!
//! Provides:
//! - `ConnectionStateMachine` - Start, observe and log out the session
//! - `BroadcastDispatcher` - Single and paced bulk sends
//! - Credential storage implementations (filesystem, memory)
//! - `QrSvgRenderer` - Pairing code rendering

pub mod dispatch;
pub mod machine;
pub mod pacing;
pub mod render;
pub mod state;
pub mod storage;

pub use dispatch::{BroadcastDispatcher, BroadcastReport, DispatchError, Outcome, RecipientOutcome};
pub use machine::ConnectionStateMachine;
pub use pacing::{Pacer, RandomPacer};
pub use render::QrSvgRenderer;
pub use state::SessionContext;
