//! wowza2whep - WHEP signaling gateway daemon.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use wowza_whep::{server, Config, Manager};

/// Command-line arguments. Every flag has an environment variable
/// fallback; an explicit flag wins over the environment.
#[derive(Parser, Debug)]
#[command(name = "wowza2whep")]
#[command(version)]
#[command(about = "Signaling-only WHEP gateway for Wowza Streaming Engine")]
#[command(long_about = "wowza2whep lets standard WHEP players watch streams served by a \n\
    Wowza Streaming Engine instance. It translates the single WHEP HTTP \n\
    POST into Wowza's WebSocket signaling handshake and returns an SDP \n\
    answer that connects the browser to Wowza directly; no media flows \n\
    through the gateway.\n\n\
    MODES:\n    \
    static:  --websocket wss://wowza.example/webrtc-session.json\n             \
    serves /whep/{codec}/{app}/{stream}\n    \
    dynamic: no --websocket flag\n             \
    serves /whep/cloud/{codec}/{host}/{app}/{stream}")]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = ":8080")]
    listen: String,

    /// Wowza WebSocket URL for static mode
    #[arg(long = "websocket", env = "WOWZA_WEBSOCKET_URL")]
    websocket: Option<String>,

    /// Allowed Wowza hosts, comma-separated, supports *.suffix wildcards
    #[arg(long, env = "ALLOWED_HOSTS", default_value = "")]
    allowed_hosts: String,

    /// WebSocket signaling timeout (e.g. 30s, 500ms, 2m)
    #[arg(long, env = "WS_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    ws_timeout: Duration,

    /// Skip TLS certificate verification when dialing Wowza
    #[arg(long, env = "INSECURE_TLS")]
    insecure_tls: bool,

    /// Enable debug logging
    #[arg(short, long, env = "VERBOSE")]
    verbose: bool,

    /// Log format: auto, text, json
    #[arg(long, env = "LOG_FORMAT", default_value = "auto")]
    log_format: String,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            listen_addr: self.listen,
            wowza_ws_url: self.websocket.filter(|url| !url.is_empty()),
            allowed_hosts: self.allowed_hosts,
            ws_timeout: self.ws_timeout,
            insecure_tls: self.insecure_tls,
            verbose: self.verbose,
            log_format: self.log_format,
        }
    }
}

/// Parse a duration string: `30s`, `500ms`, `2m`, `1h` or bare seconds.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split_at = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split_at);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {raw}"))?;

    let seconds = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit: {other}")),
    };
    Ok(Duration::from_secs_f64(seconds))
}

fn init_logging(config: &Config) {
    let level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    match config.resolved_log_format() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .with_target(false)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .init(),
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    let config = Arc::new(Args::parse().into_config());
    init_logging(&config);

    let mode = if config.wowza_ws_url.is_some() {
        "static"
    } else {
        "dynamic"
    };
    info!(
        version = wowza_whep::VERSION,
        listen = %config.listen_addr,
        mode,
        "starting wowza2whep"
    );
    if let Some(url) = &config.wowza_ws_url {
        info!(url = %url, "using static Wowza URL");
    }

    let manager = Manager::new(config.clone());

    if let Err(err) = server::serve(config, manager, shutdown_signal()).await {
        error!(error = %err, "server error");
        std::process::exit(1);
    }

    info!("shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10 parsecs").is_err());
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "wowza2whep",
            "--listen",
            ":9090",
            "--websocket",
            "wss://w.example/webrtc-session.json",
            "--allowed-hosts",
            "*.cloud.wowza.com",
            "--ws-timeout",
            "10s",
            "--verbose",
        ]);
        let config = args.into_config();
        assert_eq!(config.listen_addr, ":9090");
        assert_eq!(
            config.wowza_ws_url.as_deref(),
            Some("wss://w.example/webrtc-session.json")
        );
        assert_eq!(config.ws_timeout, Duration::from_secs(10));
        assert!(config.verbose);
        assert!(!config.insecure_tls);
    }

    #[test]
    fn test_empty_websocket_flag_means_dynamic() {
        let args = Args::parse_from(["wowza2whep", "--websocket", ""]);
        let config = args.into_config();
        assert!(config.wowza_ws_url.is_none());
    }
}
