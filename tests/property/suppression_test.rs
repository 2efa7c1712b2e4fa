//! Property-based tests for event suppression while a restore holds the gate.
//!
//! No tab event handled while the gate is closed may change the store, whether
//! it comes from the user or from the restore's own tab operations.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::Value;
use tokio::sync::mpsc;

use tabkeeper::app::App;
use tabkeeper::database::{KeyValueStore, MemoryStore};
use tabkeeper::managers::session_store::{ACTIVE_SESSION_KEY, FOLDERS_KEY, LAST_ACTIVE_TAB_INDEX_KEY};
use tabkeeper::services::reconciler::{ReconcileOutcome, SuppressReason};
use tabkeeper::services::simulated_browser::SimulatedBrowser;
use tabkeeper::types::settings::EngineSettings;
use tabkeeper::types::tab::{ChangeInfo, LiveTab, TabEvent, TabRecord, TabStatus};

fn arb_url() -> impl Strategy<Value = String> {
    prop_oneof![
        "https://[a-c]\\.dev/",
        Just("chrome://newtab/".to_string()),
        Just(String::new()),
    ]
}

fn arb_live_tab() -> impl Strategy<Value = LiveTab> {
    (1i64..8, 1i64..3, arb_url(), any::<bool>()).prop_map(|(id, window_id, url, active)| LiveTab {
        id,
        window_id,
        index: 0,
        title: url.clone(),
        url,
        fav_icon_url: None,
        active,
        pinned: false,
        status: Some(TabStatus::Complete),
    })
}

fn arb_change() -> impl Strategy<Value = ChangeInfo> {
    (
        prop::option::of(prop_oneof![Just(TabStatus::Loading), Just(TabStatus::Complete)]),
        prop::option::of(arb_url()),
        prop::option::of("[A-Za-z]{0,8}"),
        prop::option::of("https://[a-c]\\.dev/favicon\\.ico"),
    )
        .prop_map(|(status, url, title, fav_icon_url)| ChangeInfo {
            status,
            url,
            title,
            fav_icon_url,
        })
}

fn arb_event() -> impl Strategy<Value = TabEvent> {
    prop_oneof![
        arb_live_tab().prop_map(|tab| TabEvent::Created { tab }),
        (1i64..8, 1i64..3).prop_map(|(tab_id, window_id)| TabEvent::Activated { tab_id, window_id }),
        (arb_change(), arb_live_tab()).prop_map(|(change, tab)| TabEvent::Updated {
            tab_id: tab.id,
            change,
            tab,
        }),
        (1i64..8, prop::option::of(1i64..3)).prop_map(|(tab_id, window_id)| TabEvent::Removed { tab_id, window_id }),
    ]
}

fn app(settle_ms: u64) -> (App, Arc<SimulatedBrowser>, Arc<dyn KeyValueStore>) {
    let (browser, _window) = SimulatedBrowser::with_window(&["https://a.dev/", "https://b.dev/", "https://c.dev/"]);
    let browser = Arc::new(browser);
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let settings = EngineSettings {
        restore_settle_ms: settle_ms,
        ..EngineSettings::default()
    };
    (App::new(Arc::clone(&kv), browser.clone(), settings), browser, kv)
}

async fn snapshot(kv: &Arc<dyn KeyValueStore>) -> serde_json::Map<String, Value> {
    kv.get(&[FOLDERS_KEY, ACTIVE_SESSION_KEY, LAST_ACTIVE_TAB_INDEX_KEY])
        .await
        .unwrap()
}

fn seed_records() -> Vec<TabRecord> {
    (1..=3)
        .map(|id| TabRecord {
            id: Some(id),
            ..TabRecord::unbound(format!("https://{}.dev/", ["a", "b", "c"][(id - 1) as usize]), "")
        })
        .collect()
}

// **Suppression during restore**
//
// *For any* sequence of created/activated/updated/removed events handled
// while the gate is held, every event is suppressed and the store is unchanged.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn events_under_held_gate_never_write(events in prop::collection::vec(arb_event(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (app, _browser, kv) = app(0);
            app.store.save_session("f", "s", seed_records()).await.unwrap();
            app.store.set_active_session("f", "s").await.unwrap();
            app.store.set_last_active_tab_index(0).await.unwrap();
            let before = snapshot(&kv).await;

            let guard = app.orchestrator.gate().try_acquire().unwrap();
            for event in events {
                let outcome = app.reconciler.handle_event(event).await.unwrap();
                prop_assert_eq!(outcome, ReconcileOutcome::Suppressed(SuppressReason::Restoring));
            }
            drop(guard);

            prop_assert_eq!(snapshot(&kv).await, before);
            Ok(())
        })?;
    }
}

// *For any* user events arriving while a restore's own tab churn is still
// being delivered (inside the settle window), the session keeps exactly what
// the restore wrote.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn restore_churn_and_user_events_are_absorbed(events in prop::collection::vec(arb_event(), 0..30)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async {
            let (app, browser, kv) = app(500);
            let (feed, rx) = mpsc::unbounded_channel::<TabEvent>();
            let _loop = app.attach_event_feed(rx);
            let mut host_events = browser.subscribe();
            let host_feed = feed.clone();
            tokio::spawn(async move {
                while let Some(event) = host_events.recv().await {
                    if host_feed.send(event).is_err() {
                        break;
                    }
                }
            });

            let stored = vec![
                TabRecord::unbound("https://x.dev/", ""),
                TabRecord::unbound("https://y.dev/", ""),
            ];
            app.store.save_session("f", "s", stored).await.unwrap();
            app.orchestrator.restore("f", "s", false).await.unwrap();
            let written = snapshot(&kv).await;
            prop_assert!(app.orchestrator.gate().is_restoring());

            for event in events {
                feed.send(event).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(100)).await;

            prop_assert!(app.orchestrator.gate().is_restoring());
            prop_assert_eq!(snapshot(&kv).await, written);

            tokio::time::sleep(Duration::from_millis(500)).await;
            prop_assert!(!app.orchestrator.gate().is_restoring());
            Ok(())
        })?;
    }
}
