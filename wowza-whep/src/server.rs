//! WHEP HTTP surface.
//!
//! The `/whep` entry points are wildcard routes with hand-rolled path
//! parsing: app and stream are positional, the stream may carry a query
//! token, and a trailing `session-` segment turns the request into a
//! session operation regardless of what precedes it. That grammar does not
//! map onto typed per-route extractors, so one dispatcher owns it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::manager::{Manager, ManagerStats};
use crate::{SDP_CONTENT_TYPE, SESSION_ID_PREFIX, TRICKLE_CONTENT_TYPE, VERSION};

/// Maximum accepted SDP offer size.
const MAX_OFFER_BYTES: usize = 64 * 1024;
/// Maximum accepted trickle-ICE fragment size.
const MAX_FRAGMENT_BYTES: usize = 4 * 1024;
/// Bound on draining the session registry at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const STATIC_USAGE: &str = "format: /whep/{codec}/{app}/{stream} where codec is h264 or vp8";
const CLOUD_USAGE: &str =
    "format: /whep/cloud/{codec}/{host}/{app}/{stream} where codec is h264 or vp8";

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<Manager>,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/whep", any(whep_entry))
        .route("/whep/", any(whep_entry))
        .route("/whep/*path", any(whep_entry))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .expose_headers([
                    header::LOCATION,
                    header::LINK,
                    header::HeaderName::from_static("accept-patch"),
                ]),
        )
        .layer(middleware::from_fn(log_requests))
}

/// Bind the listen address and serve until `shutdown` resolves, then drain
/// the session registry.
pub async fn serve<F>(config: Arc<Config>, manager: Arc<Manager>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = normalize_listen_addr(&config.listen_addr)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server started");

    let app = router(AppState {
        config,
        manager: manager.clone(),
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    manager.shutdown(SHUTDOWN_TIMEOUT).await
}

/// Accept `:8080` as shorthand for all interfaces.
fn normalize_listen_addr(listen_addr: &str) -> Result<SocketAddr> {
    let addr = if listen_addr.starts_with(':') {
        format!("0.0.0.0{listen_addr}")
    } else {
        listen_addr.to_string()
    };
    addr.parse()
        .map_err(|_| GatewayError::Config(format!("invalid listen address: {listen_addr}")))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    if path != "/health" {
        info!(
            method = %method,
            path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "HTTP request"
        );
    }
    response
}

/// Dispatcher for everything under `/whep`.
async fn whep_entry(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let body = request.into_body();

    let rest = path
        .strip_prefix("/whep")
        .unwrap_or("")
        .trim_start_matches('/');

    if let Some(cloud_rest) = rest.strip_prefix("cloud/") {
        handle_cloud(state, method, &path, cloud_rest, headers, body).await
    } else if rest == "cloud" {
        plain(StatusCode::BAD_REQUEST, CLOUD_USAGE)
    } else {
        handle_static_mode(state, method, &path, rest, headers, body).await
    }
}

/// Static mode: `/whep/{codec}/{app}/{stream}` against the configured
/// Wowza URL.
async fn handle_static_mode(
    state: AppState,
    method: Method,
    request_path: &str,
    rest: &str,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(ws_url) = state.config.wowza_ws_url.clone() else {
        return plain(
            StatusCode::SERVICE_UNAVAILABLE,
            "websocket URL not configured - use /whep/cloud/ or start with --websocket flag",
        );
    };

    if rest.is_empty() {
        return plain(StatusCode::BAD_REQUEST, STATIC_USAGE);
    }

    let parts: Vec<&str> = rest.split('/').collect();
    if let Some(session_id) = trailing_session_id(&parts) {
        return handle_session_op(state, method, session_id, headers, body).await;
    }
    if parts.len() < 3 {
        return plain(StatusCode::BAD_REQUEST, STATIC_USAGE);
    }

    if !is_supported_codec(parts[0]) {
        return plain(StatusCode::BAD_REQUEST, "codec must be h264 or vp8");
    }

    let (app_name, stream_name) = match parse_app_stream(&parts[1..].join("/")) {
        Ok(names) => names,
        Err(message) => return plain(StatusCode::BAD_REQUEST, message),
    };

    match method {
        Method::POST => {
            handle_create(state, request_path, headers, body, &app_name, &stream_name, &ws_url)
                .await
        }
        Method::OPTIONS => whep_options(),
        _ => plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

/// Dynamic mode: `/whep/cloud/{codec}/{host}/{app}/{stream}` with the
/// Wowza endpoint derived from the host segment.
async fn handle_cloud(
    state: AppState,
    method: Method,
    request_path: &str,
    rest: &str,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if rest.is_empty() {
        return plain(StatusCode::BAD_REQUEST, CLOUD_USAGE);
    }

    let parts: Vec<&str> = rest.split('/').collect();
    if let Some(session_id) = trailing_session_id(&parts) {
        return handle_session_op(state, method, session_id, headers, body).await;
    }
    if parts.len() < 4 {
        return plain(StatusCode::BAD_REQUEST, CLOUD_USAGE);
    }

    if !is_supported_codec(parts[0]) {
        return plain(StatusCode::BAD_REQUEST, "codec must be h264 or vp8");
    }

    let host = parts[1];
    if !is_valid_host(host) {
        return plain(StatusCode::BAD_REQUEST, "invalid host");
    }
    if !state.config.is_host_allowed(host) {
        warn!(host, "host not allowed");
        return plain(StatusCode::FORBIDDEN, "host not allowed");
    }

    let (app_name, stream_name) = match parse_app_stream(&parts[2..].join("/")) {
        Ok(names) => names,
        Err(message) => return plain(StatusCode::BAD_REQUEST, message),
    };

    let ws_url = derive_cloud_ws_url(host);

    match method {
        Method::POST => {
            handle_create(state, request_path, headers, body, &app_name, &stream_name, &ws_url)
                .await
        }
        Method::OPTIONS => whep_options(),
        _ => plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

async fn handle_create(
    state: AppState,
    request_path: &str,
    headers: HeaderMap,
    body: Body,
    app_name: &str,
    stream_name: &str,
    ws_url: &str,
) -> Response {
    let offer = match axum::body::to_bytes(body, MAX_OFFER_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return plain(StatusCode::BAD_REQUEST, "failed to read offer"),
    };
    if offer.is_empty() {
        return plain(StatusCode::BAD_REQUEST, "empty SDP offer");
    }
    if !content_type(&headers).contains(SDP_CONTENT_TYPE) {
        return plain(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/sdp",
        );
    }
    let offer = String::from_utf8_lossy(&offer).into_owned();

    info!(
        app = app_name,
        stream = stream_name,
        user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(""),
        "WHEP create request"
    );

    let (session_id, session) = state.manager.create(app_name, stream_name, ws_url);

    let answer = match session.negotiate(&offer).await {
        Ok(answer) => answer,
        Err(err) => {
            error!(session_id = %session_id, error = %err, "signaling failed");
            state.manager.remove(&session_id);
            let message = match &err {
                GatewayError::WowzaStatus { .. } => err.to_string(),
                _ => "signaling failed".to_string(),
            };
            return plain(StatusCode::BAD_GATEWAY, message);
        }
    };

    debug!(session_id = %session_id, sdp = %answer, "SDP answer");

    let location = format!("{}/{}", request_path.trim_end_matches('/'), session_id);
    let response = Response::builder()
        .status(StatusCode::CREATED)
        .header(header::CONTENT_TYPE, SDP_CONTENT_TYPE)
        .header(header::LOCATION, &location)
        .header("Accept-Patch", TRICKLE_CONTENT_TYPE)
        .header(header::LINK, format!("<{location}>; rel=\"ice-server\""))
        .body(Body::from(answer))
        .unwrap();

    info!(
        session_id = %session_id,
        app = app_name,
        stream = stream_name,
        "WHEP session created"
    );

    response
}

async fn handle_session_op(
    state: AppState,
    method: Method,
    session_id: &str,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(session) = state.manager.get(session_id) else {
        return plain(StatusCode::NOT_FOUND, "session not found");
    };

    match method {
        Method::PATCH => {
            if !content_type(&headers).contains(TRICKLE_CONTENT_TYPE) {
                return plain(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "Content-Type must be application/trickle-ice-sdpfrag",
                );
            }
            let fragment = match axum::body::to_bytes(body, MAX_FRAGMENT_BYTES).await {
                Ok(bytes) => bytes,
                Err(_) => return plain(StatusCode::BAD_REQUEST, "failed to read body"),
            };
            let fragment = String::from_utf8_lossy(&fragment);
            let (candidate, sdp_mid) = parse_ice_fragment(&fragment);
            if !candidate.is_empty() {
                session.add_ice_candidate(&candidate, sdp_mid.as_deref());
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Method::DELETE => {
            state.manager.remove(session_id);
            StatusCode::OK.into_response()
        }
        Method::OPTIONS => whep_options(),
        _ => plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    }
}

/// WHEP capability response for non-preflight OPTIONS.
fn whep_options() -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Accept-Post", SDP_CONTENT_TYPE)
        .header("Accept-Patch", TRICKLE_CONTENT_TYPE)
        .body(Body::empty())
        .unwrap()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
    timestamp: i64,
    version: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        active_sessions: state.manager.active_ids().len(),
        timestamp: chrono::Utc::now().timestamp(),
        version: VERSION,
    })
}

async fn handle_stats(State(state): State<AppState>) -> Json<ManagerStats> {
    Json(state.manager.stats())
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn trailing_session_id<'a>(parts: &[&'a str]) -> Option<&'a str> {
    parts
        .last()
        .filter(|last| last.starts_with(SESSION_ID_PREFIX))
        .copied()
}

fn is_supported_codec(codec: &str) -> bool {
    matches!(codec.to_lowercase().as_str(), "h264" | "vp8")
}

/// Parse `{app}/{stream}` and validate both names. The stream may carry a
/// query token which is excluded from validation but kept in the name.
fn parse_app_stream(path: &str) -> std::result::Result<(String, String), String> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 2 {
        return Err("format: {app}/{stream}".to_string());
    }

    let app_name = parts[0].to_string();
    let stream_name = parts[1..].join("/");

    if !is_valid_path_segment(&app_name) {
        return Err("invalid app name".to_string());
    }
    let stream_base = stream_name.split('?').next().unwrap_or("");
    if !is_valid_path_segment(stream_base) {
        return Err("invalid stream name".to_string());
    }

    Ok((app_name, stream_name))
}

fn is_valid_path_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.len() > 64 || segment == "." || segment == ".." {
        return false;
    }
    segment
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return false;
    }
    let bytes = host.as_bytes();
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    !(host.contains("..") || first == b'.' || first == b'-' || last == b'.' || last == b'-')
}

/// Derive the Wowza signaling URL from a host segment. A dotted host is
/// used verbatim; a bare identifier expands to the Wowza Cloud entrypoint.
fn derive_cloud_ws_url(host: &str) -> String {
    if host.contains('.') {
        format!("wss://{host}/webrtc-session.json")
    } else {
        format!("wss://{host}.entrypoint.cloud.wowza.com/webrtc-session.json")
    }
}

/// Extract the candidate and mid from a trickle-ICE SDP fragment.
fn parse_ice_fragment(fragment: &str) -> (String, Option<String>) {
    let mut candidate = String::new();
    let mut sdp_mid = None;
    for line in crate::sdp::split_sdp_lines(fragment) {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("a=candidate:") {
            candidate = format!("candidate:{rest}");
        } else if let Some(mid) = line.strip_prefix("a=mid:") {
            sdp_mid = Some(mid.to_string());
        }
    }
    (candidate, sdp_mid)
}
