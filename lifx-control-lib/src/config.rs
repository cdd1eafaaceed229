use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_PORT;

/// Runtime settings shared by discovery, commands and effects.
///
/// Every field has a default, so a partial YAML or JSON document works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifxConfig {
    /// Subnet to broadcast discovery to, in CIDR form.
    pub subnet: String,
    /// Bulb UDP port.
    pub port: u16,
    /// Local address the client socket binds to.
    pub bind_address: SocketAddr,
    /// Per attempt discovery window and single reply wait, in milliseconds.
    pub timeout_ms: u64,
    /// Discovery broadcast attempts.
    pub retries: u32,
    /// Default transition for power and color commands, in milliseconds.
    pub fade_ms: u64,
    /// Ask for and wait on an Acknowledgement for every command.
    pub require_ack: bool,
    /// Query label, color and product of newly found devices.
    pub refresh_on_discover: bool,
}

impl Default for LifxConfig {
    fn default() -> Self {
        LifxConfig {
            subnet: "192.168.1.0/24".to_string(),
            port: DEFAULT_PORT,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            timeout_ms: 2000,
            retries: 3,
            fade_ms: 0,
            require_ack: false,
            refresh_on_discover: true,
        }
    }
}

impl LifxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}
