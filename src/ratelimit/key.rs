//! Client key derivation.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// User id substituted when a caller supplies none in `user_and_ip` mode.
pub const ANONYMOUS_USER: &str = "anonymous";

/// How a client key is built from caller identity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum KeyMode {
    /// Callers sharing an address share a limit
    #[default]
    Ip,
    /// Callers are isolated by user id, then address
    UserAndIp,
}

/// Opaque identity a limiter keeps state for.
///
/// Two requests with equal keys draw from the same limit; nothing else about
/// the key is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Derive the key for a caller at `ip` with an optional user id.
    pub fn derive(mode: KeyMode, ip: IpAddr, user_id: Option<&str>) -> Self {
        match mode {
            KeyMode::Ip => Self(ip.to_string()),
            KeyMode::UserAndIp => {
                let user = user_id
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .unwrap_or(ANONYMOUS_USER);
                Self(format!("{}:{}", user, ip))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
