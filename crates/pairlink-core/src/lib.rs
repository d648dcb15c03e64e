//! Core abstractions for a paired messaging session control plane.
//!
//! This crate provides the fundamental building blocks:
//! - `ConnectionStatus` / `SessionSnapshot` - What callers observe
//! - `ProtocolEvent` - Typed events from the protocol capability
//! - `Recipient` - Digits-only recipient normalisation
//! - `SessionConfig` - Storage root, identity and pacing settings
//! - Protocol, transport, credential store and renderer traits
//! - `loopback` - An in-process protocol capability for tests and demos

pub mod config;
pub mod event;
pub mod loopback;
pub mod recipient;
pub mod status;
pub mod traits;

pub use config::{PacingWindow, SessionConfig};
pub use event::{DisconnectReason, ProtocolEvent};
pub use recipient::Recipient;
pub use status::{ConnectionStatus, SessionSnapshot};
pub use traits::{
    Connection, ConnectOptions, CredentialRecord, CredentialStore, PairingRenderer,
    ProtocolCapability, ProtocolError, ProtocolVersion, RenderError, SessionTransport,
    StoreError,
};
