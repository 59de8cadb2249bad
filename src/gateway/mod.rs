//! API gateway: a small HTTP reverse proxy in front of the services.
//!
//! Requests arrive as `/api/{service}/...`. The gateway verifies the bearer
//! token (unless the path is on the public allowlist), injects the caller's
//! identity as headers, and forwards the request to the backend configured
//! for that service segment.

mod handler;
mod service;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub use handler::GatewayHandler;
pub use service::Forwarder;

use crate::config::GatewayConfig;
use crate::token::TokenService;

/// Backend target for forwarded requests
#[derive(Debug, Clone)]
pub struct Backend {
    /// Host and port, e.g. "127.0.0.1:8081"
    pub authority: String,
}

impl Backend {
    /// Parse a base URL like "http://127.0.0.1:8081" into an authority.
    /// Only plain http backends are supported.
    fn from_base_url(url: &str) -> Option<Self> {
        let authority = url
            .strip_prefix("http://")?
            .trim_end_matches('/')
            .to_string();
        if authority.is_empty() {
            return None;
        }
        Some(Self { authority })
    }
}

/// Static route table mapping service path segments to backends
#[derive(Debug, Default)]
pub struct RouteTable {
    backends: HashMap<String, Backend>,
}

impl RouteTable {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut backends = HashMap::new();
        for (segment, url) in &config.backends {
            match Backend::from_base_url(url) {
                Some(backend) => {
                    info!(segment = %segment, backend = %backend.authority, "Gateway route");
                    backends.insert(segment.clone(), backend);
                }
                None => {
                    error!(segment = %segment, url = %url, "Invalid backend URL, route skipped");
                }
            }
        }
        Self { backends }
    }

    /// Resolve an incoming path to a backend and the path to forward.
    ///
    /// "/api/carrito/usuario/1" becomes ("carrito", "/carrito/usuario/1"):
    /// the "/api" prefix is stripped, the service segment picks the backend
    /// and stays in the forwarded path.
    pub fn resolve<'a>(&self, path: &'a str) -> Option<(&Backend, &'a str)> {
        let rest = path.strip_prefix("/api/")?;
        let segment = rest.split('/').next()?;
        let backend = self.backends.get(segment)?;
        // Forward everything after "/api", keeping the service segment
        Some((backend, &path[4..]))
    }
}

/// Allowlist of paths that skip token verification
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    patterns: Vec<String>,
}

impl PublicPaths {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// A trailing '*' matches any suffix; anything else is an exact match
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => path == pattern,
            }
        })
    }
}

/// Gateway server that listens for incoming HTTP connections
pub struct GatewayServer {
    handler: GatewayHandler,
    bind_addr: SocketAddr,
}

impl GatewayServer {
    pub fn new(config: &GatewayConfig, tokens: TokenService, bind_addr: SocketAddr) -> Self {
        let routes = Arc::new(RouteTable::from_config(config));
        let public = PublicPaths::new(config.public_paths.clone());
        Self {
            handler: GatewayHandler::new(routes, public, tokens),
            bind_addr,
        }
    }

    /// Start the gateway server
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!("Gateway listening on http://{}", self.bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle_connection(stream, remote_addr).await {
                            error!(error = %e, "Error handling gateway connection");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::from_config(&GatewayConfig::default())
    }

    #[test]
    fn test_resolve_keeps_service_segment() {
        let table = table();

        let (backend, path) = table.resolve("/api/carrito/usuario/user-1").unwrap();
        assert_eq!(backend.authority, "127.0.0.1:8081");
        assert_eq!(path, "/carrito/usuario/user-1");

        let (backend, path) = table.resolve("/api/productos/42").unwrap();
        assert_eq!(backend.authority, "127.0.0.1:8082");
        assert_eq!(path, "/productos/42");
    }

    #[test]
    fn test_resolve_unknown_segment() {
        let table = table();
        assert!(table.resolve("/api/pagos/checkout").is_none());
        assert!(table.resolve("/carrito/usuario/user-1").is_none());
        assert!(table.resolve("/api").is_none());
        assert!(table.resolve("/api/").is_none());
    }

    #[test]
    fn test_backend_from_base_url() {
        assert_eq!(
            Backend::from_base_url("http://127.0.0.1:8081/").unwrap().authority,
            "127.0.0.1:8081"
        );
        assert!(Backend::from_base_url("https://example.com").is_none());
        assert!(Backend::from_base_url("http://").is_none());
    }

    #[test]
    fn test_public_paths_wildcard() {
        let public = PublicPaths::new(vec![
            "/api/auth/*".to_string(),
            "/health".to_string(),
        ]);

        assert!(public.matches("/api/auth/login"));
        assert!(public.matches("/api/auth/refresh"));
        assert!(public.matches("/health"));

        assert!(!public.matches("/api/carrito/usuario/user-1"));
        assert!(!public.matches("/health/deep"));
        assert!(!public.matches("/api/authz"));
    }
}
