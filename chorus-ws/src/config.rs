//! Construction parameters for the server and client runtimes (§6).

use std::time::Duration;

use chorus_net::DEFAULT_PACKET_QSIZE;

/// Construction options for [`crate::server::Server`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Admission cap; `None` means unbounded.
    pub max_connection: Option<usize>,
    /// Per-connection inbound/outbound queue size.
    pub packet_qsize: usize,
    /// Keepalive ping period; `None` disables pings.
    pub ping_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            max_connection: None,
            packet_qsize: DEFAULT_PACKET_QSIZE,
            ping_interval: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Construction options for [`crate::client::Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub uri: String,
    pub max_packet_qsize: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            max_packet_qsize: DEFAULT_PACKET_QSIZE,
        }
    }
}

impl ClientConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults_match_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.packet_qsize, 128);
        assert!(cfg.max_connection.is_none());
        assert!(cfg.ping_interval.is_none());
    }

    #[test]
    fn bind_addr_combines_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9001,
            ..Default::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9001");
    }

    #[test]
    fn client_config_new_sets_uri() {
        let cfg = ClientConfig::new("ws://localhost:9001");
        assert_eq!(cfg.uri, "ws://localhost:9001");
        assert_eq!(cfg.max_packet_qsize, 128);
    }
}
