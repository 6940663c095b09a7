//! Gateway configuration.

use std::io::IsTerminal;
use std::time::Duration;

/// Runtime configuration.
///
/// `wowza_ws_url` selects the operating mode: when set, `/whep/...`
/// requests negotiate against that fixed URL (static mode); when unset,
/// only `/whep/cloud/...` requests are served and the Wowza endpoint is
/// derived from the request path (dynamic mode).
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address. A bare `:port` is bound on all interfaces.
    pub listen_addr: String,
    /// Wowza WebSocket URL for static mode.
    pub wowza_ws_url: Option<String>,
    /// Comma-separated host allow-list for dynamic mode. Empty or `*`
    /// allows every host; a leading `*.` matches any DNS suffix.
    pub allowed_hosts: String,
    /// Deadline for the whole WebSocket negotiation.
    pub ws_timeout: Duration,
    /// Skip TLS certificate verification when dialing Wowza.
    pub insecure_tls: bool,
    /// Enable debug logging.
    pub verbose: bool,
    /// Log format: `auto`, `text` or `json`.
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: ":8080".to_string(),
            wowza_ws_url: None,
            allowed_hosts: String::new(),
            ws_timeout: Duration::from_secs(30),
            insecure_tls: false,
            verbose: false,
            log_format: "auto".to_string(),
        }
    }
}

impl Config {
    /// Check whether a Wowza host passes the allow-list.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        let allowed = self.allowed_hosts.trim();
        if allowed.is_empty() || allowed == "*" {
            return true;
        }
        let host = host.trim().to_lowercase();
        for pattern in allowed.split(',') {
            let pattern = pattern.trim().to_lowercase();
            if pattern.is_empty() || pattern == "*" {
                return true;
            }
            if match_host(&pattern, &host) {
                return true;
            }
        }
        false
    }

    /// Resolve the `auto` log format against the terminal.
    pub fn resolved_log_format(&self) -> &'static str {
        match self.log_format.to_lowercase().as_str() {
            "json" => "json",
            "text" => "text",
            _ => {
                if std::io::stdout().is_terminal() {
                    "text"
                } else {
                    "json"
                }
            }
        }
    }
}

/// Match one allow-list pattern against a host. `*.example.com` matches
/// `foo.example.com` and `bar.foo.example.com`, not `example.com`.
fn match_host(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix("*.") {
        let suffix = format!(".{rest}");
        return host.ends_with(&suffix);
    }
    false
}
