pub mod monitor;
pub mod safety;
pub mod state;
pub mod tx;

use serde::Deserialize;

/// Control-link settings. The defaults describe the stock receiver board:
/// the Pico W access point at 192.168.4.1, port 4444, one frame every 20 ms.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub target_addr: String,
    pub port: u16,

    /// Send-loop tick period in milliseconds.
    pub rate_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            target_addr: "192.168.4.1".to_string(),
            port: pilot_proto::frame::DEFAULT_PORT,
            rate_ms: 20,
        }
    }
}
