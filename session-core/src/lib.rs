// ABOUTME: Session lifecycle and PTY<->client bridge core, independent of any HTTP framework.
// ABOUTME: Exposes Container (capability contract), Session, Bridge and Manager.

pub mod bridge;
pub mod config;
pub mod container;
pub mod error;
pub mod manager;
pub mod session;
pub mod token;

pub use bridge::{Bridge, BridgeTunables, ClientFrame, ClientSink, ClientStream, ClientTransport};
pub use config::{SessionRuntimeConfig, WsConfig};
pub use container::{Attached, Container, ExitReason};
pub use error::{BridgeError, ContainerError, SessionError};
pub use manager::{ContainerFactory, SessionManager};
pub use session::{Session, SessionState};
