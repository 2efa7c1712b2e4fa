//! Unit tests for the HostBridge tab platform.
//!
//! A scripted client answers bridged calls, either by hand or by forwarding them
//! to a simulated browser standing in for the real one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use tabkeeper::app::App;
use tabkeeper::database::MemoryStore;
use tabkeeper::services::host_bridge::HostBridge;
use tabkeeper::services::reconciler::ReconcileOutcome;
use tabkeeper::services::restore::RestoreOutcome;
use tabkeeper::services::simulated_browser::SimulatedBrowser;
use tabkeeper::services::tab_platform::TabPlatform;
use tabkeeper::types::errors::HostError;
use tabkeeper::types::settings::EngineSettings;
use tabkeeper::types::tab::{CreateProperties, TabEvent, TabQuery, TabRecord, UpdateProperties};

fn bridge(timeout_ms: u64) -> (Arc<HostBridge>, UnboundedReceiver<Value>) {
    let (bridge, requests) = HostBridge::new(Duration::from_millis(timeout_ms));
    (Arc::new(bridge), requests)
}

/// Answers every bridged call from `browser`, the way a client extension would.
fn serve(bridge: Arc<HostBridge>, mut requests: UnboundedReceiver<Value>, browser: Arc<SimulatedBrowser>) {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let call_id = request["hostCall"].clone();
            let params = &request["params"];
            let result = match request["method"].as_str().unwrap_or_default() {
                "tabs.query" => browser
                    .query_tabs(&TabQuery {
                        window_id: params["windowId"].as_i64(),
                        active: params["active"].as_bool(),
                    })
                    .await
                    .map(|tabs| json!(tabs)),
                "tabs.get" => browser.get_tab(params["tabId"].as_i64().unwrap()).await.map(|t| json!(t)),
                "tabs.create" => browser
                    .create_tab(CreateProperties {
                        url: params["url"].as_str().unwrap().to_string(),
                        window_id: params["windowId"].as_i64().unwrap(),
                        active: params["active"].as_bool().unwrap_or(false),
                        index: params["index"].as_u64().map(|i| i as usize),
                        pinned: params["pinned"].as_bool().unwrap_or(false),
                    })
                    .await
                    .map(|t| json!(t)),
                "tabs.update" => {
                    let props = &params["properties"];
                    browser
                        .update_tab(
                            params["tabId"].as_i64().unwrap(),
                            UpdateProperties {
                                url: props["url"].as_str().map(str::to_string),
                                active: props["active"].as_bool(),
                                pinned: props["pinned"].as_bool(),
                            },
                        )
                        .await
                        .map(|t| json!(t))
                }
                "tabs.move" => browser
                    .move_tab(params["tabId"].as_i64().unwrap(), params["index"].as_u64().unwrap() as usize)
                    .await
                    .map(|t| json!(t)),
                "tabs.remove" => {
                    let ids: Vec<i64> = serde_json::from_value(params["tabIds"].clone()).unwrap();
                    browser.remove_tabs(&ids).await.map(|_| Value::Null)
                }
                "windows.getCurrent" => browser.get_current_window().await.map(|w| json!(w)),
                other => Err(HostError::Rejected(format!("unknown method {}", other))),
            };
            let reply = match result {
                Ok(value) => json!({"hostReply": call_id, "result": value}),
                Err(e) => json!({"hostReply": call_id, "error": e.to_string()}),
            };
            bridge.resolve(&reply);
        }
    });
}

fn settings() -> EngineSettings {
    EngineSettings {
        restore_settle_ms: 0,
        ..EngineSettings::default()
    }
}

// ─── Wire format ───

#[tokio::test]
async fn test_get_tab_sends_request_and_decodes_reply() {
    let (bridge, mut requests) = bridge(1000);
    let caller = Arc::clone(&bridge);
    let call = tokio::spawn(async move { caller.get_tab(12).await });

    let request = requests.recv().await.unwrap();
    assert_eq!(request["method"], "tabs.get");
    assert_eq!(request["params"], json!({"tabId": 12}));
    assert_eq!(bridge.pending_calls(), 1);

    let reply = json!({
        "hostReply": request["hostCall"],
        "result": {"id": 12, "windowId": 3, "url": "https://a.dev/", "title": "A", "active": true}
    });
    assert!(HostBridge::is_reply(&reply));
    assert!(bridge.resolve(&reply));

    let tab = call.await.unwrap().unwrap();
    assert_eq!(tab.id, 12);
    assert_eq!(tab.window_id, 3);
    assert_eq!(tab.url, "https://a.dev/");
    assert!(tab.active);
    assert_eq!(bridge.pending_calls(), 0);
}

#[tokio::test]
async fn test_update_omits_unset_properties() {
    let (bridge, mut requests) = bridge(1000);
    let caller = Arc::clone(&bridge);
    tokio::spawn(async move { caller.update_tab(4, UpdateProperties::focus()).await });

    let request = requests.recv().await.unwrap();
    assert_eq!(request["method"], "tabs.update");
    assert_eq!(request["params"], json!({"tabId": 4, "properties": {"active": true}}));
}

#[tokio::test]
async fn test_error_reply_is_a_rejection() {
    let (bridge, mut requests) = bridge(1000);
    let caller = Arc::clone(&bridge);
    let call = tokio::spawn(async move { caller.get_tab(99).await });

    let request = requests.recv().await.unwrap();
    bridge.resolve(&json!({"hostReply": request["hostCall"], "error": "No tab with id: 99"}));

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err, HostError::Rejected("No tab with id: 99".to_string()));
}

#[tokio::test]
async fn test_malformed_result_is_a_rejection() {
    let (bridge, mut requests) = bridge(1000);
    let caller = Arc::clone(&bridge);
    let call = tokio::spawn(async move { caller.get_current_window().await });

    let request = requests.recv().await.unwrap();
    bridge.resolve(&json!({"hostReply": request["hostCall"], "result": "not a window"}));

    assert!(matches!(call.await.unwrap(), Err(HostError::Rejected(_))));
}

#[tokio::test]
async fn test_unanswered_call_times_out_and_late_reply_is_ignored() {
    let (bridge, mut requests) = bridge(20);

    let err = bridge.get_tab(1).await.unwrap_err();
    assert_eq!(err, HostError::Timeout(20));
    assert_eq!(bridge.pending_calls(), 0);

    let request = requests.recv().await.unwrap();
    assert!(!bridge.resolve(&json!({"hostReply": request["hostCall"], "result": null})));
}

#[tokio::test]
async fn test_closed_channel_is_disconnected() {
    let (bridge, requests) = bridge(1000);
    drop(requests);

    assert_eq!(bridge.get_current_window().await.unwrap_err(), HostError::Disconnected);
    assert_eq!(bridge.pending_calls(), 0);
}

#[test]
fn test_reply_without_id_is_rejected() {
    let (bridge, _requests) = HostBridge::new(Duration::from_millis(10));
    assert!(!HostBridge::is_reply(&json!({"event": "removed", "tabId": 1})));
    assert!(!bridge.resolve(&json!({"hostReply": "one", "result": null})));
}

// ─── Engine over the bridge ───

#[tokio::test]
async fn test_activation_from_client_host_moves_last_active_index() {
    let (browser, window) = SimulatedBrowser::with_window(&["https://a.dev/", "https://b.dev/", "https://c.dev/"]);
    let browser = Arc::new(browser);
    let (bridge, requests) = bridge(1000);
    serve(Arc::clone(&bridge), requests, Arc::clone(&browser));
    let app = App::new(Arc::new(MemoryStore::new()), bridge, settings());

    let records: Vec<TabRecord> = browser
        .tabs_in(window)
        .iter()
        .map(|t| TabRecord {
            id: Some(t.id),
            ..TabRecord::unbound(t.url.clone(), "")
        })
        .collect();
    let second = records[1].id.unwrap();
    app.store.save_session("work", "s", records).await.unwrap();
    app.store.set_active_session("work", "s").await.unwrap();

    let outcome = app
        .reconciler
        .handle_event(TabEvent::Activated { tab_id: second, window_id: window })
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated { index: 1 });
    assert_eq!(app.store.get_last_active_tab_index().await.unwrap(), Some(1));
    let stored = app.store.get_session("work", "s").await.unwrap().unwrap();
    assert!(stored[1].active);
}

#[tokio::test]
async fn test_restore_over_bridge_rebuilds_client_window() {
    let (browser, window) = SimulatedBrowser::with_window(&["https://old.dev/"]);
    let browser = Arc::new(browser);
    let (bridge, requests) = bridge(1000);
    serve(Arc::clone(&bridge), requests, Arc::clone(&browser));
    let app = App::new(Arc::new(MemoryStore::new()), bridge, settings());
    app.store
        .save_session(
            "work",
            "s",
            vec![TabRecord::unbound("https://x.dev/", ""), TabRecord::unbound("https://y.dev/", "")],
        )
        .await
        .unwrap();

    let outcome = app.orchestrator.restore("work", "s", false).await.unwrap();

    let RestoreOutcome::Restored(report) = outcome else {
        panic!("expected a restore");
    };
    assert_eq!(report.failures, 0);
    assert_eq!(report.window_id, window);
    let urls: Vec<String> = browser.tabs_in(window).into_iter().map(|t| t.url).collect();
    assert_eq!(urls, vec!["https://x.dev/", "https://y.dev/"]);
    let stored = app.store.get_session("work", "s").await.unwrap().unwrap();
    let ids: Vec<_> = stored.iter().map(|r| r.id).collect();
    let live: Vec<_> = browser.tabs_in(window).iter().map(|t| Some(t.id)).collect();
    assert_eq!(ids, live);
}
