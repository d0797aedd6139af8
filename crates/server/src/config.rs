//! Server-side configuration: CLI flags plus the embedded engine tunables.

use drivelog_types::EngineConfig;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub shared_secret: Option<String>,
    pub event_log_path: Option<String>,
    pub geocode_base_url: Option<String>,
    pub snap_base_url: Option<String>,
    pub upstream_base_url: Option<String>,
    pub engine: EngineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults_are_used_when_no_config_file_given() {
        let cfg = ServerConfig {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            shared_secret: None,
            event_log_path: None,
            geocode_base_url: None,
            snap_base_url: None,
            upstream_base_url: None,
            engine: EngineConfig::default(),
        };
        assert_eq!(cfg.engine.max_waypoints, EngineConfig::default().max_waypoints);
    }
}
