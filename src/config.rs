use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Where the server listens and what it serves besides the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory served for any path the API does not handle
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .and_then(|h| match h.trim().parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!("Ignoring invalid HOST {:?}", h);
                    None
                }
            })
            .unwrap_or(defaults.bind_addr.ip());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| match p.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!("Ignoring invalid PORT {:?}", p);
                    None
                }
            })
            .unwrap_or(defaults.bind_addr.port());
        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        Self {
            bind_addr: SocketAddr::new(host, port),
            static_dir,
        }
    }
}
