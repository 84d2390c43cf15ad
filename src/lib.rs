// ABOUTME: Root library module exposing the gateway's config and HTTP layers
// ABOUTME: Session lifecycle and PTY bridging live in the session-core crate
pub mod config;
pub mod http;
