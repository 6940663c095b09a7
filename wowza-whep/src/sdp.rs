//! SDP parsing and the offer/offer bridging transform.
//!
//! Wowza acts as the offerer on its WebSocket dialect while WHEP makes the
//! browser the offerer, so a single playback request carries two offers and
//! no answer. The two builders here fabricate both answers from that pair:
//! [`answer_for_wowza`] hands Wowza the client's ICE/DTLS identity and
//! [`answer_for_client`] hands the browser Wowza's, so each side dials the
//! other directly and the gateway never touches media.
//!
//! Parsing is deliberately attribute-preserving: the Wowza-facing answer is
//! the Wowza offer re-serialized with credentials swapped, and every
//! attribute the gateway does not understand must survive the round trip.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::{GatewayError, Result};
use crate::wowza::{clean_wowza_candidate, IceCandidateInit};

/// ICE and DTLS credentials extracted from one SDP.
///
/// `ufrag`/`pwd` identify an ICE endpoint, `fingerprint` binds the DTLS
/// certificate, `setup` is the DTLS role. Candidate values are stored
/// without the `candidate:` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
    pub fingerprint: String,
    pub setup: String,
    pub candidates: Vec<String>,
}

/// Type and mid of one media section, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub media_type: String,
    pub mid: String,
}

/// A single `a=` attribute. `value` is `None` for flag attributes such as
/// `a=sendonly`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((key, value)) => Attribute::new(key, value),
            None => Attribute::flag(raw),
        }
    }

    fn to_line(&self) -> String {
        match &self.value {
            Some(value) => format!("a={}:{}", self.key, value),
            None => format!("a={}", self.key),
        }
    }
}

/// SDP origin field (`o=`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub net_type: String,
    pub addr_type: String,
    pub address: String,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            username: "-".to_string(),
            session_id: 0,
            session_version: 0,
            net_type: "IN".to_string(),
            addr_type: "IP4".to_string(),
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Origin {
    fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 6 {
            return Err(GatewayError::InvalidSdp("invalid origin line".to_string()));
        }
        Ok(Self {
            username: parts[0].to_string(),
            session_id: parts[1].parse().unwrap_or(0),
            session_version: parts[2].parse().unwrap_or(0),
            net_type: parts[3].to_string(),
            addr_type: parts[4].to_string(),
            address: parts[5].to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!(
            "o={} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.net_type,
            self.addr_type,
            self.address
        )
    }
}

/// SDP timing field (`t=`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timing {
    pub start: u64,
    pub stop: u64,
}

impl Timing {
    fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(GatewayError::InvalidSdp("invalid timing line".to_string()));
        }
        Ok(Self {
            start: parts[0].parse().unwrap_or(0),
            stop: parts[1].parse().unwrap_or(0),
        })
    }

    fn to_line(&self) -> String {
        format!("t={} {}", self.start, self.stop)
    }
}

/// One media section (`m=` and everything below it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSection {
    pub media: String,
    pub port: u16,
    pub proto: String,
    pub formats: Vec<String>,
    /// Raw `c=` value, when present.
    pub connection: Option<String>,
    pub attributes: Vec<Attribute>,
}

impl MediaSection {
    fn parse_m_line(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(GatewayError::InvalidSdp("invalid media line".to_string()));
        }
        // Ranged ports ("9/2") keep only the base port.
        let port = parts[1]
            .split('/')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(9);
        Ok(Self {
            media: parts[0].to_string(),
            port,
            proto: parts[2].to_string(),
            formats: parts[3..].iter().map(|f| f.to_string()).collect(),
            connection: None,
            attributes: Vec::new(),
        })
    }

    fn serialize_into(&self, lines: &mut Vec<String>) {
        lines.push(format!(
            "m={} {} {} {}",
            self.media,
            self.port,
            self.proto,
            self.formats.join(" ")
        ));
        if let Some(connection) = &self.connection {
            lines.push(format!("c={connection}"));
        }
        for attr in &self.attributes {
            lines.push(attr.to_line());
        }
    }
}

/// A parsed session description that keeps every attribute it saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u8,
    pub origin: Origin,
    pub session_name: String,
    /// Session-level `c=` value, when present.
    pub connection: Option<String>,
    pub timing: Timing,
    pub attributes: Vec<Attribute>,
    pub media: Vec<MediaSection>,
}

impl SessionDescription {
    /// Parse an SDP string. Unknown line types are skipped; attributes are
    /// retained verbatim at the level they appear.
    pub fn parse(sdp: &str) -> Result<Self> {
        let mut desc = SessionDescription {
            session_name: "-".to_string(),
            ..SessionDescription::default()
        };
        let mut current: Option<MediaSection> = None;

        for line in split_sdp_lines(sdp) {
            let line = line.trim();
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                continue;
            }
            let (key, value) = (line.as_bytes()[0], &line[2..]);
            match key {
                b'v' => desc.version = value.parse().unwrap_or(0),
                b'o' => desc.origin = Origin::parse(value)?,
                b's' => desc.session_name = value.to_string(),
                b't' => desc.timing = Timing::parse(value)?,
                b'c' => match current.as_mut() {
                    Some(media) => media.connection = Some(value.to_string()),
                    None => desc.connection = Some(value.to_string()),
                },
                b'm' => {
                    if let Some(media) = current.take() {
                        desc.media.push(media);
                    }
                    current = Some(MediaSection::parse_m_line(value)?);
                }
                b'a' => match current.as_mut() {
                    Some(media) => media.attributes.push(Attribute::parse(value)),
                    None => desc.attributes.push(Attribute::parse(value)),
                },
                _ => {}
            }
        }
        if let Some(media) = current {
            desc.media.push(media);
        }

        Ok(desc)
    }

    /// Serialize with CRLF terminators.
    pub fn to_sdp(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("v={}", self.version));
        lines.push(self.origin.to_line());
        lines.push(format!("s={}", self.session_name));
        if let Some(connection) = &self.connection {
            lines.push(format!("c={connection}"));
        }
        lines.push(self.timing.to_line());
        for attr in &self.attributes {
            lines.push(attr.to_line());
        }
        for media in &self.media {
            media.serialize_into(&mut lines);
        }
        lines.join("\r\n") + "\r\n"
    }
}

/// Split SDP into lines on CRLF, falling back to LF when CRLF yields a
/// single line.
pub fn split_sdp_lines(sdp: &str) -> Vec<&str> {
    let lines: Vec<&str> = sdp.split("\r\n").collect();
    if lines.len() == 1 {
        sdp.split('\n').collect()
    } else {
        lines
    }
}

/// Extract ICE/DTLS credentials from an SDP. Scans every level; for scalar
/// fields the last occurrence wins, candidates accumulate across sections.
pub fn extract_credentials(sdp: &str) -> IceCredentials {
    let mut creds = IceCredentials::default();
    for line in split_sdp_lines(sdp) {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("a=ice-ufrag:") {
            creds.ufrag = value.to_string();
        } else if let Some(value) = line.strip_prefix("a=ice-pwd:") {
            creds.pwd = value.to_string();
        } else if let Some(value) = line.strip_prefix("a=fingerprint:") {
            creds.fingerprint = value.to_string();
        } else if let Some(value) = line.strip_prefix("a=setup:") {
            creds.setup = value.to_string();
        } else if let Some(value) = line.strip_prefix("a=candidate:") {
            creds.candidates.push(value.to_string());
        }
    }
    creds
}

/// Extract the ordered media types and mids of an SDP.
pub fn extract_media_order(sdp: &str) -> Vec<MediaInfo> {
    let mut result = Vec::new();
    let mut current: Option<MediaInfo> = None;

    for line in split_sdp_lines(sdp) {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("m=") {
            if let Some(info) = current.take() {
                result.push(info);
            }
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() >= 4 {
                current = Some(MediaInfo {
                    media_type: parts[0].to_string(),
                    mid: String::new(),
                });
            }
        } else if let Some(info) = current.as_mut() {
            if let Some(mid) = line.strip_prefix("a=mid:") {
                info.mid = mid.to_string();
            }
        }
    }
    if let Some(info) = current {
        result.push(info);
    }

    result
}

/// Build the SDP answer sent to Wowza.
///
/// The Wowza offer is the template; the client's ICE/DTLS identity is
/// substituted into it so that Wowza's connectivity checks and DTLS
/// handshake land on the browser. `setup` is forced to `active`,
/// `sendrecv` flips to `recvonly`, Wowza's own candidates are dropped and
/// the client's are appended.
pub fn answer_for_wowza(wowza_offer: &str, client_offer: &str) -> Result<String> {
    let client = extract_credentials(client_offer);
    let mut desc = SessionDescription::parse(wowza_offer)?;

    if !client.fingerprint.is_empty() {
        for attr in &mut desc.attributes {
            if attr.key == "fingerprint" {
                attr.value = Some(client.fingerprint.clone());
            }
        }
    }

    for media in &mut desc.media {
        let mut rebuilt = Vec::with_capacity(media.attributes.len() + client.candidates.len());
        for attr in media.attributes.drain(..) {
            match attr.key.as_str() {
                "ice-ufrag" => {
                    if !client.ufrag.is_empty() {
                        rebuilt.push(Attribute::new("ice-ufrag", &client.ufrag));
                    }
                }
                "ice-pwd" => {
                    if !client.pwd.is_empty() {
                        rebuilt.push(Attribute::new("ice-pwd", &client.pwd));
                    }
                }
                "fingerprint" => {
                    if !client.fingerprint.is_empty() {
                        rebuilt.push(Attribute::new("fingerprint", &client.fingerprint));
                    }
                }
                "setup" => rebuilt.push(Attribute::new("setup", "active")),
                "sendrecv" => rebuilt.push(Attribute::flag("recvonly")),
                "candidate" => {}
                _ => rebuilt.push(attr),
            }
        }
        for candidate in &client.candidates {
            rebuilt.push(Attribute::new("candidate", candidate));
        }
        media.attributes = rebuilt;
    }

    let serialized = desc.to_sdp();
    Ok(add_trickle_ice(&filter_private_ips(&serialized)))
}

/// Build the SDP answer returned to the WHEP client.
///
/// The answer follows the client offer's media order and mids (the
/// PeerConnection refuses to bind an answer whose mids disagree with its
/// transceivers) while carrying Wowza's ICE/DTLS identity, payload types
/// and candidates, so the browser dials Wowza directly. Client media types
/// Wowza does not serve come back as rejected sections.
pub fn answer_for_client(
    wowza_offer: &str,
    client_offer: &str,
    wowza_candidates: &[IceCandidateInit],
) -> Result<String> {
    let client_media = extract_media_order(client_offer);
    let wowza = extract_credentials(wowza_offer);
    if wowza.fingerprint.is_empty() {
        return Err(GatewayError::MissingFingerprint);
    }

    let wowza_desc = SessionDescription::parse(wowza_offer)?;
    let mut wowza_by_type: HashMap<String, &MediaSection> = HashMap::new();
    for media in &wowza_desc.media {
        wowza_by_type.insert(media.media.to_lowercase(), media);
    }

    let bundle_mids: Vec<&str> = client_media.iter().map(|m| m.mid.as_str()).collect();
    let mut answer = SessionDescription {
        version: 0,
        origin: Origin {
            session_id: wowza_desc.origin.session_id,
            session_version: wowza_desc.origin.session_version,
            ..Origin::default()
        },
        session_name: "-".to_string(),
        connection: None,
        timing: Timing { start: 0, stop: 0 },
        attributes: vec![
            Attribute::new("group", format!("BUNDLE {}", bundle_mids.join(" "))),
            Attribute::new("msid-semantic", "WMS *"),
            Attribute::new("fingerprint", &wowza.fingerprint),
        ],
        media: Vec::new(),
    };

    for (index, client_info) in client_media.iter().enumerate() {
        let media_type = client_info.media_type.to_lowercase();

        let Some(wowza_media) = wowza_by_type.get(&media_type) else {
            // Media type not served by Wowza: reject the section but keep
            // the slot so the answer still lines up with the offer.
            answer.media.push(MediaSection {
                media: media_type,
                port: 0,
                proto: "UDP/TLS/RTP/SAVPF".to_string(),
                formats: vec!["0".to_string()],
                connection: None,
                attributes: vec![
                    Attribute::new("mid", &client_info.mid),
                    Attribute::new("ice-ufrag", &wowza.ufrag),
                    Attribute::new("ice-pwd", &wowza.pwd),
                    Attribute::new("fingerprint", &wowza.fingerprint),
                    Attribute::new("setup", "passive"),
                    Attribute::flag("inactive"),
                ],
            });
            continue;
        };

        let mut attrs = Vec::new();
        for attr in &wowza_media.attributes {
            if matches!(
                attr.key.as_str(),
                "rtpmap" | "fmtp" | "rtcp-fb" | "ssrc" | "msid" | "cliprect" | "framesize"
                    | "control"
            ) {
                attrs.push(attr.clone());
            }
        }

        attrs.push(Attribute::new("ice-ufrag", &wowza.ufrag));
        attrs.push(Attribute::new("ice-pwd", &wowza.pwd));
        attrs.push(Attribute::new("fingerprint", &wowza.fingerprint));
        // Passive: Wowza waits for the browser to start the DTLS handshake.
        attrs.push(Attribute::new("setup", "passive"));
        // The client's mid, never Wowza's (video/audio vs 0/1).
        attrs.push(Attribute::new("mid", &client_info.mid));
        attrs.push(Attribute::flag("sendonly"));
        attrs.push(Attribute::flag("rtcp-mux"));

        for candidate in wowza_candidates {
            if candidate.sdp_m_line_index == Some(index as u16) {
                let cleaned = clean_wowza_candidate(&candidate.candidate);
                let cleaned = cleaned.strip_prefix("candidate:").unwrap_or(&cleaned);
                attrs.push(Attribute::new("candidate", cleaned));
            }
        }

        answer.media.push(MediaSection {
            media: wowza_media.media.clone(),
            port: 9,
            proto: "UDP/TLS/RTP/SAVPF".to_string(),
            formats: wowza_media.formats.clone(),
            connection: Some("IN IP4 0.0.0.0".to_string()),
            attributes: attrs,
        });
    }

    Ok(answer.to_sdp())
}

/// Remove candidates Wowza Cloud cannot reach: private, loopback,
/// link-local and non-IPv4 addresses. `a=end-of-candidates` is dropped as
/// well so trickling stays open.
pub fn filter_private_ips(sdp: &str) -> String {
    let mut filtered = Vec::new();
    for line in split_sdp_lines(sdp) {
        if line.starts_with("a=end-of-candidates") {
            continue;
        }
        if line.starts_with("a=candidate:") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 5 {
                if let Ok(ip) = fields[4].parse::<IpAddr>() {
                    let unreachable = match ip {
                        IpAddr::V4(v4) => {
                            v4.is_private() || v4.is_loopback() || v4.is_link_local()
                        }
                        IpAddr::V6(_) => true,
                    };
                    if unreachable {
                        continue;
                    }
                }
            }
        }
        filtered.push(line);
    }
    filtered.join("\r\n")
}

/// Insert `a=ice-options:trickle` after the first `a=ice-ufrag` unless the
/// option is already present.
pub fn add_trickle_ice(sdp: &str) -> String {
    if sdp.contains("a=ice-options:trickle") {
        return sdp.to_string();
    }
    let lines = split_sdp_lines(sdp);
    let mut result = Vec::with_capacity(lines.len() + 1);
    let mut added = false;
    for line in lines {
        result.push(line.to_string());
        if !added && line.starts_with("a=ice-ufrag:") {
            result.push("a=ice-options:trickle".to_string());
            added = true;
        }
    }
    result.join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_OFFER: &str = "v=0\r\n\
        o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        a=group:BUNDLE video audio\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=ice-ufrag:clientUfrag\r\n\
        a=ice-pwd:clientPwdclientPwd\r\n\
        a=fingerprint:sha-256 AA:BB:CC:DD\r\n\
        a=setup:actpass\r\n\
        a=mid:video\r\n\
        a=rtpmap:96 H264/90000\r\n\
        a=recvonly\r\n\
        a=candidate:1 1 UDP 2130706431 10.0.0.1 50000 typ host\r\n\
        a=candidate:2 1 UDP 2130706431 93.184.216.34 50001 typ host\r\n\
        a=end-of-candidates\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=ice-ufrag:clientUfrag\r\n\
        a=ice-pwd:clientPwdclientPwd\r\n\
        a=fingerprint:sha-256 AA:BB:CC:DD\r\n\
        a=setup:actpass\r\n\
        a=mid:audio\r\n\
        a=rtpmap:111 opus/48000/2\r\n\
        a=recvonly\r\n";

    const WOWZA_OFFER: &str = "v=0\r\n\
        o=- 1234567890 2 IN IP4 127.0.0.1\r\n\
        s=WowzaStreamingEngine\r\n\
        t=0 0\r\n\
        a=fingerprint:sha-256 EE:FF:00:11\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 97\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=ice-ufrag:wowzaUfrag\r\n\
        a=ice-pwd:wowzaPwdwowzaPwd\r\n\
        a=fingerprint:sha-256 EE:FF:00:11\r\n\
        a=setup:actpass\r\n\
        a=mid:0\r\n\
        a=rtpmap:97 H264/90000\r\n\
        a=fmtp:97 packetization-mode=1;profile-level-id=42e01f\r\n\
        a=ssrc:1111 cname:wowza\r\n\
        a=sendrecv\r\n\
        a=candidate:1 1 UDP 100 203.0.113.5 8443 typ host\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 96\r\n\
        c=IN IP4 0.0.0.0\r\n\
        a=ice-ufrag:wowzaUfrag\r\n\
        a=ice-pwd:wowzaPwdwowzaPwd\r\n\
        a=fingerprint:sha-256 EE:FF:00:11\r\n\
        a=setup:actpass\r\n\
        a=mid:1\r\n\
        a=rtpmap:96 opus/48000/2\r\n\
        a=sendrecv\r\n";

    #[test]
    fn test_split_crlf_and_lf() {
        assert_eq!(split_sdp_lines("a\r\nb\r\nc"), vec!["a", "b", "c"]);
        assert_eq!(split_sdp_lines("a\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_lf_only_offer() {
        let lf_offer = CLIENT_OFFER.replace("\r\n", "\n");
        let desc = SessionDescription::parse(&lf_offer).unwrap();
        assert_eq!(desc.media.len(), 2);
        assert_eq!(desc.media[0].media, "video");
    }

    #[test]
    fn test_extract_credentials() {
        let creds = extract_credentials(CLIENT_OFFER);
        assert_eq!(creds.ufrag, "clientUfrag");
        assert_eq!(creds.pwd, "clientPwdclientPwd");
        assert_eq!(creds.fingerprint, "sha-256 AA:BB:CC:DD");
        assert_eq!(creds.setup, "actpass");
        assert_eq!(creds.candidates.len(), 2);
        assert!(creds.candidates[0].starts_with("1 1 UDP"));
    }

    #[test]
    fn test_extract_media_order() {
        let media = extract_media_order(CLIENT_OFFER);
        assert_eq!(media.len(), 2);
        assert_eq!(media[0].media_type, "video");
        assert_eq!(media[0].mid, "video");
        assert_eq!(media[1].media_type, "audio");
        assert_eq!(media[1].mid, "audio");
    }

    #[test]
    fn test_answer_for_wowza_swaps_credentials() {
        let answer = answer_for_wowza(WOWZA_OFFER, CLIENT_OFFER).unwrap();

        assert!(answer.contains("a=ice-ufrag:clientUfrag"));
        assert!(answer.contains("a=ice-pwd:clientPwdclientPwd"));
        assert!(answer.contains("a=fingerprint:sha-256 AA:BB:CC:DD"));
        assert!(!answer.contains("wowzaUfrag"));
        assert!(!answer.contains("wowzaPwd"));
        assert!(!answer.contains("EE:FF:00:11"));
        assert!(answer.contains("a=setup:active"));
        assert!(!answer.contains("a=setup:actpass"));
        assert!(answer.contains("a=recvonly"));
        assert!(!answer.contains("a=sendrecv"));
        // Wowza's own candidate never comes back to it.
        assert!(!answer.contains("203.0.113.5"));
    }

    #[test]
    fn test_answer_for_wowza_passes_codec_attributes_through() {
        let answer = answer_for_wowza(WOWZA_OFFER, CLIENT_OFFER).unwrap();
        assert!(answer.contains("a=rtpmap:97 H264/90000"));
        assert!(answer.contains("a=fmtp:97 packetization-mode=1;profile-level-id=42e01f"));
        assert!(answer.contains("a=ssrc:1111 cname:wowza"));
    }

    #[test]
    fn test_answer_for_wowza_filters_private_client_candidates() {
        let answer = answer_for_wowza(WOWZA_OFFER, CLIENT_OFFER).unwrap();
        assert!(!answer.contains("10.0.0.1"));
        assert!(answer.contains("93.184.216.34"));
        assert!(!answer.contains("a=end-of-candidates"));
    }

    #[test]
    fn test_answer_for_wowza_adds_trickle_after_first_ufrag() {
        let answer = answer_for_wowza(WOWZA_OFFER, CLIENT_OFFER).unwrap();
        assert_eq!(answer.matches("a=ice-options:trickle").count(), 1);
        let lines: Vec<&str> = answer.split("\r\n").collect();
        let ufrag = lines
            .iter()
            .position(|l| l.starts_with("a=ice-ufrag:"))
            .unwrap();
        assert_eq!(lines[ufrag + 1], "a=ice-options:trickle");
    }

    #[test]
    fn test_answer_for_client_uses_wowza_credentials_and_client_mids() {
        let candidates = vec![
            IceCandidateInit {
                candidate: "candidate:1 1 UDP 2130706431 203.0.113.5 8443 typ host generation 0"
                    .to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
            IceCandidateInit {
                candidate: "candidate:2 1 TCP 100 203.0.113.5 8443 typ host".to_string(),
                sdp_mid: Some("1".to_string()),
                sdp_m_line_index: Some(1),
            },
        ];
        let answer = answer_for_client(WOWZA_OFFER, CLIENT_OFFER, &candidates).unwrap();

        assert!(answer.contains("a=ice-ufrag:wowzaUfrag"));
        assert!(answer.contains("a=fingerprint:sha-256 EE:FF:00:11"));
        assert!(!answer.contains("clientUfrag"));
        assert!(!answer.contains("AA:BB:CC:DD"));
        assert!(answer.contains("a=setup:passive"));
        assert!(answer.contains("a=mid:video"));
        assert!(answer.contains("a=mid:audio"));
        assert!(!answer.contains("a=mid:0"));
        assert!(answer.contains("a=group:BUNDLE video audio"));
        assert!(answer.contains("a=sendonly"));
        assert!(answer.contains("a=rtcp-mux"));
        // Wowza's payload types survive in the m= lines.
        assert!(answer.contains("m=video 9 UDP/TLS/RTP/SAVPF 97"));
        assert!(answer.contains("m=audio 9 UDP/TLS/RTP/SAVPF 96"));
        // Origin carries Wowza's session identifiers.
        assert!(answer.contains("o=- 1234567890 2 IN IP4 127.0.0.1"));
        // Candidates are cleaned and emitted exactly once per index.
        assert!(answer.contains("a=candidate:1 1 UDP 2130706431 203.0.113.5 8443 typ host\r\n"));
        assert!(!answer.contains("generation"));
        assert!(answer.contains("a=candidate:2 1 TCP 100 203.0.113.5 8443 typ host tcptype passive"));
        assert!(!answer.contains("candidate:candidate"));
    }

    #[test]
    fn test_answer_for_client_media_order_follows_client() {
        let answer = answer_for_client(WOWZA_OFFER, CLIENT_OFFER, &[]).unwrap();
        let video = answer.find("m=video").unwrap();
        let audio = answer.find("m=audio").unwrap();
        assert!(video < audio);
    }

    #[test]
    fn test_answer_for_client_rejects_unserved_media() {
        let offer_with_data = format!(
            "{CLIENT_OFFER}m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
             a=mid:data\r\n"
        );
        let answer = answer_for_client(WOWZA_OFFER, &offer_with_data, &[]).unwrap();
        assert!(answer.contains("m=application 0 UDP/TLS/RTP/SAVPF 0"));
        assert!(answer.contains("a=mid:data"));
        assert!(answer.contains("a=inactive"));
        assert!(answer.contains("a=group:BUNDLE video audio data"));
    }

    #[test]
    fn test_answer_for_client_requires_fingerprint() {
        let bare_offer = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
            m=video 9 UDP/TLS/RTP/SAVPF 97\r\na=mid:0\r\n";
        let err = answer_for_client(bare_offer, CLIENT_OFFER, &[]).unwrap_err();
        assert!(err.to_string().contains("missing fingerprint"));
    }

    #[test]
    fn test_filter_private_ips() {
        let sdp = "a=candidate:1 1 UDP 100 10.0.0.1 9 typ host\r\n\
            a=candidate:2 1 UDP 100 93.184.216.34 9 typ host\r\n\
            a=candidate:3 1 UDP 100 127.0.0.1 9 typ host\r\n\
            a=candidate:4 1 UDP 100 169.254.1.1 9 typ host\r\n\
            a=candidate:5 1 UDP 100 2001:db8::1 9 typ host\r\n\
            a=end-of-candidates\r\n\
            a=mid:video";
        let filtered = filter_private_ips(sdp);
        assert!(filtered.contains("93.184.216.34"));
        assert!(!filtered.contains("10.0.0.1"));
        assert!(!filtered.contains("127.0.0.1"));
        assert!(!filtered.contains("169.254.1.1"));
        assert!(!filtered.contains("2001:db8::1"));
        assert!(!filtered.contains("a=end-of-candidates"));
        assert!(filtered.contains("a=mid:video"));
    }

    #[test]
    fn test_filter_keeps_unparseable_addresses() {
        let sdp = "a=candidate:1 1 UDP 100 not-an-ip 9 typ host";
        assert_eq!(filter_private_ips(sdp), sdp);
    }

    #[test]
    fn test_add_trickle_ice_is_idempotent() {
        let sdp = "v=0\r\na=ice-ufrag:abc\r\na=ice-pwd:def";
        let once = add_trickle_ice(sdp);
        assert_eq!(once.matches("a=ice-options:trickle").count(), 1);
        let twice = add_trickle_ice(&once);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_parse_roundtrip_preserves_unknown_attributes() {
        let desc = SessionDescription::parse(WOWZA_OFFER).unwrap();
        let out = desc.to_sdp();
        assert!(out.contains("a=ssrc:1111 cname:wowza"));
        assert!(out.contains("a=fmtp:97 packetization-mode=1;profile-level-id=42e01f"));
        assert!(out.contains("s=WowzaStreamingEngine"));
    }
}
