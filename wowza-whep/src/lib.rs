//! Signaling-only WHEP gateway for Wowza Streaming Engine.
//!
//! Wowza exposes WebRTC playback through a proprietary WebSocket-plus-JSON
//! dialect in which *Wowza* is the SDP offerer. Standard WHEP clients
//! (RFC 9725) expect the opposite: they POST an SDP offer over HTTP and
//! receive an answer. This crate bridges the two by terminating the WHEP
//! POST, driving Wowza's `getOffer`/`sendResponse` handshake over a
//! short-lived WebSocket, and fabricating two answers from the offer/offer
//! pair with swapped ICE/DTLS identities. The browser then connects to
//! Wowza directly; no RTP/RTCP ever passes through the gateway.
//!
//! # Request flow
//!
//! 1. Client POSTs an SDP offer to `/whep/{codec}/{app}/{stream}` (static
//!    mode) or `/whep/cloud/{codec}/{host}/{app}/{stream}` (dynamic mode).
//! 2. The gateway dials Wowza's `webrtc-session.json` WebSocket and sends
//!    `getOffer`, receiving Wowza's offer and session id.
//! 3. An answer carrying the *client's* ICE/DTLS credentials goes back via
//!    `sendResponse`; Wowza replies with its ICE candidates.
//! 4. The gateway returns `201 Created` with an answer carrying *Wowza's*
//!    credentials and candidates, restructured to the client's media order
//!    and mids. The WebSocket is closed.
//! 5. `DELETE` on the returned Location removes the session record.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wowza_whep::{Config, Manager};
//!
//! #[tokio::main]
//! async fn main() -> wowza_whep::Result<()> {
//!     let config = Arc::new(Config {
//!         wowza_ws_url: Some("wss://wowza.example/webrtc-session.json".into()),
//!         ..Config::default()
//!     });
//!     let manager = Manager::new(config.clone());
//!     wowza_whep::server::serve(config, manager, std::future::pending()).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod sdp;
pub mod server;
pub mod session;
pub mod wowza;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use manager::{Manager, ManagerStats};
pub use server::{router, serve, AppState};
pub use session::{Session, SessionStats};

/// Gateway version reported on `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WHEP offer/answer content type.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Trickle-ICE fragment content type.
pub const TRICKLE_CONTENT_TYPE: &str = "application/trickle-ice-sdpfrag";

/// Session ids are `session-` + UUIDv4; the router keys on this prefix to
/// tell session operations apart from create requests.
pub const SESSION_ID_PREFIX: &str = "session-";
