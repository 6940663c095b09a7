//! Error types for the WHEP gateway.

use thiserror::Error;

/// Error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid SDP offer or answer.
    #[error("invalid SDP: {0}")]
    InvalidSdp(String),

    /// Wowza's offer carried no DTLS fingerprint; the client answer cannot
    /// be built without one.
    #[error("wowza offer missing fingerprint")]
    MissingFingerprint,

    /// Wowza responded to `getOffer` with an empty SDP.
    #[error("wowza returned empty SDP offer")]
    EmptyOffer,

    /// Wowza answered with a non-2xx status.
    #[error("wowza error: {description}")]
    WowzaStatus { status: i64, description: String },

    /// `negotiate` was called more than once on a session.
    #[error("session already negotiated")]
    AlreadyNegotiated,

    /// A signaling step did not complete before the deadline.
    #[error("signaling timeout: {0}")]
    Timeout(String),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// TLS connector construction failure.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Malformed JSON on the Wowza socket.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Graceful shutdown did not drain all sessions in time.
    #[error("shutdown deadline exceeded")]
    ShutdownTimeout,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
