// ABOUTME: Configuration types shared between the HTTP layer and the session core.
// ABOUTME: session_runtime.* and session_runtime.ws.* from the recognized configuration table.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `session_runtime.*` — container image, workspace base path, optional nvim config mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRuntimeConfig {
    pub image_name: String,
    pub base_path: String,
    #[serde(default)]
    pub nvim_config_path: Option<String>,
    #[serde(default)]
    pub ws: WsConfig,
}

/// `session_runtime.ws.*` — client transport tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    pub max_message_size: usize,
    #[serde(with = "humantime_secs")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub ping_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024,
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
        }
    }
}

impl WsConfig {
    /// Validate the constraint the spec requires: `ping_interval < read_timeout`.
    pub fn validate(&self) -> Result<(), String> {
        if self.ping_interval >= self.read_timeout {
            return Err(format!(
                "ping_interval ({:?}) must be strictly less than read_timeout ({:?})",
                self.ping_interval, self.read_timeout
            ));
        }
        Ok(())
    }
}

/// Serialize/deserialize a `Duration` as whole seconds, matching the teacher's
/// preference for plain TOML scalars over nested duration structs.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ws_config_satisfies_ping_constraint() {
        assert!(WsConfig::default().validate().is_ok());
    }

    #[test]
    fn ping_interval_must_be_less_than_read_timeout() {
        let cfg = WsConfig {
            ping_interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            ..WsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
