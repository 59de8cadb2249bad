//! Gateway connection handler.
//!
//! Parses incoming requests, enforces token verification for non-public
//! paths, injects the caller's identity headers, and forwards to the
//! resolved backend.

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use super::{Forwarder, PublicPaths, RouteTable};
use crate::token::{Claims, TokenService};

/// Identity headers injected for backends. Client-supplied values are always
/// stripped so they cannot be spoofed through the gateway.
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Handles incoming gateway connections
#[derive(Clone)]
pub struct GatewayHandler {
    routes: Arc<RouteTable>,
    public: PublicPaths,
    tokens: TokenService,
    forwarder: Forwarder,
}

impl GatewayHandler {
    pub fn new(routes: Arc<RouteTable>, public: PublicPaths, tokens: TokenService) -> Self {
        Self {
            routes,
            public,
            tokens,
            forwarder: Forwarder::new(),
        }
    }

    /// Handle a single TCP connection
    pub async fn handle_connection(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> anyhow::Result<()> {
        let io = TokioIo::new(stream);
        let handler = self.clone();

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let handler = handler.clone();
                    async move { handler.handle_request(req, remote_addr).await }
                }),
            )
            .await?;

        Ok(())
    }

    /// Handle a single HTTP request
    async fn handle_request(
        &self,
        mut req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        debug!(
            method = %method,
            path = %path,
            remote = %remote_addr,
            "Incoming gateway request"
        );

        if path == "/health" {
            return Ok(json_response(StatusCode::OK, r#"{"status":"ok"}"#));
        }

        strip_client_identity(&mut req);

        if !self.public.matches(&path) {
            let claims = match self.verify_request(req.headers()) {
                Ok(claims) => claims,
                Err(response) => {
                    warn!(method = %method, path = %path, "Rejected unauthenticated request");
                    return Ok(response);
                }
            };
            inject_identity(&mut req, &claims);
        }

        let (backend, forward_path) = match self.routes.resolve(&path) {
            Some((backend, forward_path)) => (backend.clone(), forward_path.to_string()),
            None => {
                warn!(path = %path, "No backend for path");
                return Ok(error_response(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "No service for this path",
                ));
            }
        };

        info!(
            method = %method,
            path = %path,
            backend = %backend.authority,
            "Forwarding request"
        );

        match self.forwarder.forward(req, &backend, &forward_path).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(error = %e, backend = %backend.authority, "Backend request failed");
                Ok(error_response(
                    StatusCode::BAD_GATEWAY,
                    "bad_gateway",
                    "Backend unavailable",
                ))
            }
        }
    }

    /// Verify the bearer token on a protected request
    fn verify_request(
        &self,
        headers: &hyper::HeaderMap,
    ) -> Result<Claims, Response<BoxBody<Bytes, hyper::Error>>> {
        let token = headers
            .get(hyper::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        let token = token.ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing bearer token",
            )
        })?;

        self.tokens.verify_access(token).map_err(|e| {
            debug!(error = %e, "Token rejected");
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or expired token",
            )
        })
    }
}

/// Identity headers only ever come from the gateway itself; drop any copies
/// the client sent
fn strip_client_identity<B>(req: &mut Request<B>) {
    req.headers_mut().remove(USER_ID_HEADER);
    req.headers_mut().remove(USER_ROLE_HEADER);
}

/// Add the verified caller's identity as forwarding headers
fn inject_identity<B>(req: &mut Request<B>, claims: &Claims) {
    let headers = req.headers_mut();
    if let Ok(value) = hyper::header::HeaderValue::from_str(&claims.sub) {
        headers.insert(USER_ID_HEADER, value);
    }
    let roles = claims.roles.as_deref().unwrap_or_default().join(",");
    if let Ok(value) = hyper::header::HeaderValue::from_str(&roles) {
        headers.insert(USER_ROLE_HEADER, value);
    }
}

fn json_response(status: StatusCode, body: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(
            Full::new(Bytes::from(body.to_string()))
                .map_err(|e| match e {})
                .boxed(),
        )
        .unwrap()
}

/// JSON error envelope in the same shape the services use
fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let body = serde_json::json!({
        "error": { "code": code, "message": message }
    });
    json_response(status, &body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, GatewayConfig};
    use crate::token::TokenService;
    use http_body_util::Empty;
    use hyper::HeaderMap;

    fn token_service() -> TokenService {
        let config = AuthConfig {
            jwt_secret: "test-secret".to_string(),
            ..AuthConfig::default()
        };
        TokenService::new(&config)
    }

    fn handler() -> GatewayHandler {
        let config = GatewayConfig::default();
        GatewayHandler::new(
            Arc::new(RouteTable::from_config(&config)),
            PublicPaths::new(config.public_paths),
            token_service(),
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        headers
    }

    async fn body_string(response: Response<BoxBody<Bytes, hyper::Error>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let handler = handler();

        let response = handler.verify_request(&HeaderMap::new()).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_string(response).await;
        assert!(body.contains("unauthorized"));
        assert!(body.contains("Missing bearer token"));
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let handler = handler();

        let response = handler.verify_request(&bearer("not-a-jwt")).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_string(response).await;
        assert!(body.contains("Invalid or expired token"));
    }

    #[tokio::test]
    async fn test_refresh_token_is_rejected() {
        let handler = handler();
        let refresh = token_service().issue_refresh_token("user-1").unwrap();

        let response = handler.verify_request(&bearer(&refresh)).unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_valid_token_injects_identity() {
        let handler = handler();
        let token = token_service()
            .issue_access_token("user-1", &["ADMIN".to_string(), "CLIENTE".to_string()])
            .unwrap();

        let claims = handler.verify_request(&bearer(&token)).unwrap();
        assert_eq!(claims.sub, "user-1");

        let mut req = Request::builder()
            .uri("/api/carrito/usuario/user-1")
            .body(Empty::<Bytes>::new())
            .unwrap();
        inject_identity(&mut req, &claims);

        assert_eq!(req.headers().get(USER_ID_HEADER).unwrap(), "user-1");
        assert_eq!(req.headers().get(USER_ROLE_HEADER).unwrap(), "ADMIN,CLIENTE");
    }

    #[test]
    fn test_client_identity_headers_are_stripped() {
        let mut req = Request::builder()
            .uri("/api/auth/login")
            .header(USER_ID_HEADER, "attacker")
            .header(USER_ROLE_HEADER, "ADMIN")
            .body(Empty::<Bytes>::new())
            .unwrap();

        strip_client_identity(&mut req);

        assert!(req.headers().get(USER_ID_HEADER).is_none());
        assert!(req.headers().get(USER_ROLE_HEADER).is_none());
    }
}
