//! Property-based tests for identity rebinding.
//!
//! A record left without a live handle (as after a restore) must pick up the
//! handle of the first update observed for its URL, keeping the stored URL.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use tabkeeper::database::MemoryStore;
use tabkeeper::managers::session_store::SessionStore;
use tabkeeper::services::reconciler::{ReconcileOutcome, Reconciler};
use tabkeeper::services::restore_gate::RestoreGate;
use tabkeeper::services::simulated_browser::SimulatedBrowser;
use tabkeeper::types::settings::EngineSettings;
use tabkeeper::types::tab::{ChangeInfo, LiveTab, TabEvent, TabRecord, TabStatus};

const OTHER_URL: &str = "https://other.example/";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn arb_url() -> impl Strategy<Value = String> {
    "https://[a-z]{1,12}\\.(dev|com|org)/[a-z0-9/_-]{0,20}"
}

fn arb_distinct_ids() -> impl Strategy<Value = (i64, i64)> {
    (1i64..1_000_000, 1i64..1_000_000).prop_filter("ids must differ", |(a, b)| a != b)
}

fn arb_change(url: String) -> impl Strategy<Value = ChangeInfo> {
    prop_oneof![
        Just(ChangeInfo {
            status: Some(TabStatus::Complete),
            ..ChangeInfo::default()
        }),
        Just(ChangeInfo {
            url: Some(url),
            ..ChangeInfo::default()
        }),
        "[A-Za-z ]{1,20}".prop_map(|title| ChangeInfo {
            title: Some(title),
            ..ChangeInfo::default()
        }),
    ]
}

// **Identity rebind**
//
// *For any* URL and any two distinct handles, an update carrying the fresh
// handle and a matching URL binds the unbound record to the fresh handle,
// keeps its URL, and leaves the record bound to the other handle alone.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn update_rebinds_unbound_record(
        (url, change) in arb_url().prop_flat_map(|u| (Just(u.clone()), arb_change(u))),
        (stale, fresh) in arb_distinct_ids(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (browser, window) = SimulatedBrowser::with_window(&[]);
            let store = SessionStore::new(Arc::new(MemoryStore::new()));
            let reconciler = Reconciler::new(
                store.clone(),
                Arc::new(browser),
                RestoreGate::new(Duration::ZERO),
                Arc::new(EngineSettings::default()),
            );
            reconciler.set_current_window(Some(window));

            let other = TabRecord { id: Some(stale), ..TabRecord::unbound(OTHER_URL, "Other") };
            store
                .save_session("f", "s", vec![TabRecord::unbound(url.clone(), "Title"), other.clone()])
                .await
                .unwrap();
            store.set_active_session("f", "s").await.unwrap();

            let tab = LiveTab {
                id: fresh,
                window_id: window,
                index: 0,
                url: url.clone(),
                title: "Title".to_string(),
                fav_icon_url: None,
                active: false,
                pinned: false,
                status: Some(TabStatus::Complete),
            };
            let outcome = reconciler
                .handle_event(TabEvent::Updated { tab_id: fresh, change, tab })
                .await
                .unwrap();
            prop_assert_eq!(outcome, ReconcileOutcome::Updated { index: 0 });

            let records = store.get_session("f", "s").await.unwrap().unwrap();
            prop_assert_eq!(records.len(), 2);
            prop_assert_eq!(records[0].id, Some(fresh));
            prop_assert_eq!(&records[0].url, &url);
            prop_assert_eq!(&records[1], &other);
            Ok(())
        })?;
    }
}
