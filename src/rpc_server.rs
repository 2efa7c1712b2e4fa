//! TabKeeper RPC Server — newline-delimited JSON over stdin/stdout.
//!
//! Three kinds of lines are accepted on stdin:
//! Command:    {"id":1, "type":"SAVE_SESSION", "folderName":"work", "sessionName":"monday"}
//! Tab event:  {"event":"removed", "tabId":12, "windowId":1}
//! Host reply: {"hostReply":3, "result":{...}}
//!
//! Every command gets one reply line, `{"id":1, "success":true, ...}`.
//! Tab events are fed to the reconciler and produce no reply. The engine's own
//! tab calls go out as `{"hostCall":3, "method":"tabs.get", ...}` lines that the
//! client answers with a host reply. Logs go to stderr.
//!
//! `--simulated` swaps the client's browser for an in-process one.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tabkeeper::app::App;
use tabkeeper::platform;
use tabkeeper::rpc_handler::handle_message_with_timeout;
use tabkeeper::services::host_bridge::HostBridge;
use tabkeeper::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use tabkeeper::services::simulated_browser::SimulatedBrowser;
use tabkeeper::services::tab_platform::TabPlatform;
use tabkeeper::types::tab::TabEvent;

/// Simple rate limiter: max command lines per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn emit(line: &Value) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", line);
    let _ = out.flush();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let mut settings_engine = SettingsEngine::new(None);
    let settings = match settings_engine.load() {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = settings_engine.get_config_path(), error = %e, "settings unreadable, using defaults");
            settings_engine.get_settings().clone()
        }
    };

    let data_dir = platform::get_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!(dir = %data_dir.display(), error = %e, "could not create data directory");
    }
    let db_path = data_dir.join("tabkeeper.db");

    // Host events and injected events share one serial feed.
    let (feed, events) = mpsc::unbounded_channel::<TabEvent>();

    let mut bridge = None;
    let host: Arc<dyn TabPlatform> = if std::env::args().any(|arg| arg == "--simulated") {
        let browser = Arc::new(SimulatedBrowser::new());
        browser.open_window(&[]);
        let mut host_events = browser.subscribe();
        let host_feed = feed.clone();
        tokio::spawn(async move {
            while let Some(event) = host_events.recv().await {
                if host_feed.send(event).is_err() {
                    break;
                }
            }
        });
        info!("using simulated browser");
        browser
    } else {
        let (host_bridge, mut requests) = HostBridge::new(Duration::from_millis(settings.host_call_timeout_ms));
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                emit(&request);
            }
        });
        let host_bridge = Arc::new(host_bridge);
        bridge = Some(Arc::clone(&host_bridge));
        host_bridge
    };

    let app = match App::open(&db_path, host, settings) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!(db = %db_path.display(), error = %e, "failed to initialize TabKeeper");
            std::process::exit(1);
        }
    };

    app.attach_event_feed(events);

    let startup_app = Arc::clone(&app);
    tokio::spawn(async move {
        if let Err(e) = startup_app.startup().await {
            warn!(code = e.code(), error = %e, "startup restore failed");
        }
    });

    info!(db = %db_path.display(), "tabkeeper ready");
    emit(&json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

    let mut rate_limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                emit(&json!({"id": null, "success": false, "error": format!("parse error: {}", e)}));
                continue;
            }
        };

        if HostBridge::is_reply(&msg) {
            match &bridge {
                Some(bridge) => {
                    bridge.resolve(&msg);
                }
                None => warn!("host reply received without a host bridge"),
            }
            continue;
        }

        if msg.get("event").is_some() {
            match serde_json::from_value::<TabEvent>(msg) {
                Ok(event) => {
                    if feed.send(event).is_err() {
                        warn!("reconciler stopped, tab event dropped");
                    }
                }
                Err(e) => warn!(error = %e, "malformed tab event"),
            }
            continue;
        }

        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        if !rate_limiter.check() {
            emit(&json!({"id": id, "success": false, "error": "rate limit exceeded"}));
            continue;
        }

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let mut response = handle_message_with_timeout(app, msg).await;
            if let Value::Object(map) = &mut response {
                map.insert("id".to_string(), id);
            }
            emit(&response);
        });
    }
    info!("stdin closed, shutting down");
}
