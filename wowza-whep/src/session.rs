//! One signaling session, end to end.
//!
//! A session owns a single negotiation: dial the Wowza WebSocket, run the
//! four-frame exchange, return the client-facing answer and close the
//! socket. After that the session is only a bookkeeping record; the media
//! connection is browser <-> Wowza and never touches this process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::sdp;
use crate::wowza::{GetOfferRequest, SendResponseRequest, WowzaResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type StopCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Per-session statistics exposed on `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub id: String,
    pub app: String,
    pub stream: String,
    pub wowza_session_id: Option<String>,
    pub created_at: i64,
    pub age_secs: i64,
}

/// A signaling-only session. `negotiate` may be called at most once;
/// `stop` is idempotent.
pub struct Session {
    id: String,
    app_name: String,
    stream_name: String,
    ws_url: String,
    config: Arc<Config>,
    created_at: DateTime<Utc>,
    wowza_session_id: Mutex<Option<String>>,
    negotiated: AtomicBool,
    stopped: AtomicBool,
    on_stop: Option<StopCallback>,
}

impl Session {
    pub fn new(
        id: String,
        app_name: &str,
        stream_name: &str,
        ws_url: &str,
        config: Arc<Config>,
    ) -> Self {
        Self {
            id,
            app_name: app_name.to_string(),
            stream_name: stream_name.to_string(),
            ws_url: ws_url.to_string(),
            config,
            created_at: Utc::now(),
            wowza_session_id: Mutex::new(None),
            negotiated: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            on_stop: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register the callback fired exactly once when the session stops.
    pub fn set_stop_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_stop = Some(Box::new(callback));
    }

    /// Run the WHEP signaling exchange with Wowza.
    ///
    /// Wowza's play protocol is inverted from WHEP: Wowza sends the SDP
    /// offer and expects the answer. The bridge fabricates two answers
    /// with swapped ICE/DTLS credentials, one per peer.
    pub async fn negotiate(&self, client_offer: &str) -> Result<String> {
        if self.negotiated.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyNegotiated);
        }

        let deadline = tokio::time::Instant::now() + self.config.ws_timeout;
        let mut ws = self.dial().await?;
        let result = self.exchange(&mut ws, client_offer, deadline).await;
        let _ = ws.close(None).await;
        result
    }

    async fn dial(&self) -> Result<WsStream> {
        let connector = if self.config.insecure_tls {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let connect = connect_async_tls_with_config(self.ws_url.as_str(), None, false, connector);
        let (ws, _) = tokio::time::timeout(self.config.ws_timeout / 2, connect)
            .await
            .map_err(|_| GatewayError::Timeout("websocket dial".to_string()))??;
        Ok(ws)
    }

    async fn exchange(
        &self,
        ws: &mut WsStream,
        client_offer: &str,
        deadline: tokio::time::Instant,
    ) -> Result<String> {
        let get_offer = GetOfferRequest::new(&self.app_name, &self.stream_name);
        send_frame(ws, deadline, &get_offer).await?;

        let offer_resp = read_frame(ws, deadline).await?;
        if !offer_resp.is_success() {
            return Err(GatewayError::WowzaStatus {
                status: offer_resp.status,
                description: offer_resp.status_description,
            });
        }
        let wowza_offer = match offer_resp.sdp {
            Some(payload) if !payload.sdp.is_empty() => payload.sdp,
            _ => return Err(GatewayError::EmptyOffer),
        };

        let wowza_session_id = offer_resp.stream_info.session_id;
        *self.wowza_session_id.lock() = Some(wowza_session_id.clone());
        info!(
            session_id = %self.id,
            wowza_session_id = %wowza_session_id,
            "received offer from Wowza"
        );

        let answer_to_wowza = sdp::answer_for_wowza(&wowza_offer, client_offer)?;
        let send_response = SendResponseRequest::new(
            &self.app_name,
            &self.stream_name,
            &wowza_session_id,
            answer_to_wowza,
        );
        send_frame(ws, deadline, &send_response).await?;

        let candidates_resp = read_frame(ws, deadline).await?;
        if !candidates_resp.is_success() {
            return Err(GatewayError::WowzaStatus {
                status: candidates_resp.status,
                description: candidates_resp.status_description,
            });
        }
        info!(
            session_id = %self.id,
            ice_candidates = candidates_resp.ice_candidates.len(),
            "signaling complete"
        );

        sdp::answer_for_client(&wowza_offer, client_offer, &candidates_resp.ice_candidates)
    }

    /// Accepted for WHEP conformance but a no-op: Wowza returned all of its
    /// candidates in-band and the WebSocket is already closed, so there is
    /// no channel to forward client candidates to.
    pub fn add_ice_candidate(&self, candidate: &str, sdp_mid: Option<&str>) {
        debug!(
            session_id = %self.id,
            candidate,
            sdp_mid = ?sdp_mid,
            "ignoring trickle ICE candidate"
        );
    }

    /// Mark the session stopped and fire the stop callback. Safe to call
    /// from concurrent DELETE and shutdown paths; only the first call has
    /// an effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(callback) = &self.on_stop {
            callback(&self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            id: self.id.clone(),
            app: self.app_name.clone(),
            stream: self.stream_name.clone(),
            wowza_session_id: self.wowza_session_id.lock().clone(),
            created_at: self.created_at.timestamp(),
            age_secs: (Utc::now() - self.created_at).num_seconds(),
        }
    }
}

async fn send_frame<T: Serialize>(
    ws: &mut WsStream,
    deadline: tokio::time::Instant,
    frame: &T,
) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    tokio::time::timeout_at(deadline, ws.send(Message::Text(text)))
        .await
        .map_err(|_| GatewayError::Timeout("websocket write".to_string()))??;
    Ok(())
}

async fn read_frame(ws: &mut WsStream, deadline: tokio::time::Instant) -> Result<WowzaResponse> {
    loop {
        let message = tokio::time::timeout_at(deadline, ws.next())
            .await
            .map_err(|_| GatewayError::Timeout("websocket read".to_string()))?
            .ok_or(GatewayError::WebSocket(tungstenite::Error::ConnectionClosed))??;

        match message {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Binary(bytes) => return Ok(serde_json::from_slice(&bytes)?),
            Message::Close(_) => {
                return Err(GatewayError::WebSocket(tungstenite::Error::ConnectionClosed))
            }
            _ => continue,
        }
    }
}
