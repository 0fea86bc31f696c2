//! Configuration for the webrtc-backed transport.

use serde::{Deserialize, Serialize};

/// ICE server configuration used when building an [`crate::RtcTransport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcConfig {
    /// STUN servers for NAT traversal.
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,
}

fn default_stun_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun.cloudflare.com:3478".to_string(),
    ]
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
        }
    }
}
