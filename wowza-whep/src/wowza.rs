//! Wowza WebSocket signaling frames.
//!
//! Wowza Streaming Engine speaks a half-duplex request/response dialect of
//! JSON text frames over a single WebSocket. A playback negotiation is
//! exactly four frames: `getOffer` -> offer, `sendResponse` -> candidates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DIRECTION_PLAY: &str = "play";
pub const COMMAND_GET_OFFER: &str = "getOffer";
pub const COMMAND_SEND_RESPONSE: &str = "sendResponse";

/// Stream coordinates carried in every frame. The `sessionId` Wowza
/// returns in the offer response must be echoed in `sendResponse`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamInfo {
    pub application_name: String,
    pub stream_name: String,
    pub session_id: String,
}

/// An SDP payload on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSdp {
    pub sdp: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Asks Wowza for its SDP offer for playback.
///
/// `secureToken` is always present (null when unset); Wowza's endpoint
/// expects the key even for unauthenticated streams.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOfferRequest {
    pub direction: String,
    pub command: String,
    pub stream_info: StreamInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<HashMap<String, String>>,
    pub secure_token: Option<String>,
}

impl GetOfferRequest {
    pub fn new(application_name: &str, stream_name: &str) -> Self {
        Self {
            direction: DIRECTION_PLAY.to_string(),
            command: COMMAND_GET_OFFER.to_string(),
            stream_info: StreamInfo {
                application_name: application_name.to_string(),
                stream_name: stream_name.to_string(),
                session_id: String::new(),
            },
            user_data: None,
            secure_token: None,
        }
    }
}

/// Sends the fabricated SDP answer back to Wowza.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponseRequest {
    pub direction: String,
    pub command: String,
    pub stream_info: StreamInfo,
    pub sdp: SessionSdp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<HashMap<String, String>>,
}

impl SendResponseRequest {
    pub fn new(application_name: &str, stream_name: &str, session_id: &str, answer: String) -> Self {
        Self {
            direction: DIRECTION_PLAY.to_string(),
            command: COMMAND_SEND_RESPONSE.to_string(),
            stream_info: StreamInfo {
                application_name: application_name.to_string(),
                stream_name: stream_name.to_string(),
                session_id: session_id.to_string(),
            },
            sdp: SessionSdp {
                sdp: answer,
                kind: Some("answer".to_string()),
            },
            user_data: None,
        }
    }
}

/// One ICE candidate from Wowza. `sdpMLineIndex` is 0-based into the media
/// order of Wowza's original offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IceCandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Wowza's response envelope for both requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WowzaResponse {
    pub status: i64,
    pub status_description: String,
    pub direction: String,
    pub command: String,
    pub stream_info: StreamInfo,
    pub sdp: Option<SessionSdp>,
    pub ice_candidates: Vec<IceCandidateInit>,
}

impl WowzaResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Normalize a candidate string from Wowza Cloud.
///
/// Truncates the non-standard `generation N` suffix and appends
/// `tcptype passive` to TCP candidates that lack one (RFC 6544 requires a
/// tcptype for TCP candidates).
pub fn clean_wowza_candidate(candidate: &str) -> String {
    let mut cleaned = match candidate.find(" generation") {
        Some(index) if index > 0 => candidate[..index].trim().to_string(),
        _ => candidate.to_string(),
    };

    let fields: Vec<&str> = cleaned.split_whitespace().collect();
    if fields.len() >= 3 && fields[2].eq_ignore_ascii_case("tcp") && !cleaned.contains("tcptype") {
        cleaned.push_str(" tcptype passive");
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_offer_wire_format() {
        let req = GetOfferRequest::new("live", "demo");
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["direction"], "play");
        assert_eq!(json["command"], "getOffer");
        assert_eq!(json["streamInfo"]["applicationName"], "live");
        assert_eq!(json["streamInfo"]["streamName"], "demo");
        assert_eq!(json["streamInfo"]["sessionId"], "");
        // secureToken must be on the wire even when unset.
        assert!(json.as_object().unwrap().contains_key("secureToken"));
        assert!(json["secureToken"].is_null());
        assert!(!json.as_object().unwrap().contains_key("userData"));
    }

    #[test]
    fn test_send_response_echoes_session_id() {
        let req = SendResponseRequest::new("live", "demo", "wz-42", "v=0\r\n".to_string());
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["command"], "sendResponse");
        assert_eq!(json["streamInfo"]["sessionId"], "wz-42");
        assert_eq!(json["sdp"]["type"], "answer");
        assert_eq!(json["sdp"]["sdp"], "v=0\r\n");
    }

    #[test]
    fn test_response_deserialization() {
        let raw = r#"{
            "status": 200,
            "statusDescription": "OK",
            "streamInfo": {"applicationName": "live", "streamName": "demo", "sessionId": "wz-42"},
            "sdp": {"sdp": "v=0\r\n", "type": "offer"},
            "iceCandidates": [
                {"candidate": "candidate:1 1 UDP 100 1.2.3.4 9 typ host", "sdpMLineIndex": 0}
            ]
        }"#;
        let resp: WowzaResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.stream_info.session_id, "wz-42");
        assert_eq!(resp.sdp.as_ref().unwrap().sdp, "v=0\r\n");
        assert_eq!(resp.ice_candidates.len(), 1);
        assert_eq!(resp.ice_candidates[0].sdp_m_line_index, Some(0));
        assert!(resp.ice_candidates[0].sdp_mid.is_none());
    }

    #[test]
    fn test_error_response_without_sdp() {
        let raw = r#"{"status": 404, "statusDescription": "stream not found"}"#;
        let resp: WowzaResponse = serde_json::from_str(raw).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.status_description, "stream not found");
        assert!(resp.sdp.is_none());
        assert!(resp.ice_candidates.is_empty());
    }

    #[test]
    fn test_clean_strips_generation_suffix() {
        let cleaned =
            clean_wowza_candidate("candidate:1 1 UDP 100 1.2.3.4 9 typ host generation 0");
        assert_eq!(cleaned, "candidate:1 1 UDP 100 1.2.3.4 9 typ host");
    }

    #[test]
    fn test_clean_tcp_candidate() {
        let cleaned =
            clean_wowza_candidate("candidate:1 1 TCP 100 1.2.3.4 9 typ host generation 0");
        assert_eq!(
            cleaned,
            "candidate:1 1 TCP 100 1.2.3.4 9 typ host tcptype passive"
        );
    }

    #[test]
    fn test_clean_preserves_existing_tcptype() {
        let input = "candidate:1 1 tcp 100 1.2.3.4 9 typ host tcptype active";
        assert_eq!(clean_wowza_candidate(input), input);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let inputs = [
            "candidate:1 1 UDP 100 1.2.3.4 9 typ host generation 0",
            "candidate:1 1 TCP 100 1.2.3.4 9 typ host",
            "candidate:2 1 tcp 100 1.2.3.4 9 typ host tcptype passive",
        ];
        for input in inputs {
            let once = clean_wowza_candidate(input);
            assert_eq!(clean_wowza_candidate(&once), once);
        }
    }
}
