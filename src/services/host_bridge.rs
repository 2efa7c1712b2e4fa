//! Tab platform that forwards every host call to the client over NDJSON.
//!
//! Outbound request:  {"hostCall":3, "method":"tabs.get", "params":{"tabId":12}}
//! Client reply:      {"hostReply":3, "result":{...}}
//!                    {"hostReply":3, "error":"No tab with id: 12"}
//!
//! Requests go out on the channel returned by [`HostBridge::new`]; the server
//! writes them to stdout and hands reply lines back through [`HostBridge::resolve`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::services::tab_platform::TabPlatform;
use crate::types::errors::HostError;
use crate::types::tab::{CreateProperties, LiveTab, TabHandle, TabQuery, UpdateProperties, WindowId};

type Reply = Result<Value, String>;

pub struct HostBridge {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_call: AtomicU64,
    timeout: Duration,
}

impl HostBridge {
    /// Creates the bridge and the receiver its requests are written to.
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let bridge = Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            timeout,
        };
        (bridge, requests)
    }

    /// True for lines that answer a host call.
    pub fn is_reply(message: &Value) -> bool {
        message.get("hostReply").is_some()
    }

    /// Delivers a client reply to the waiting call. Returns false when no call
    /// with that id is pending (late reply after a timeout, or a bad id).
    pub fn resolve(&self, message: &Value) -> bool {
        let Some(call_id) = message.get("hostReply").and_then(Value::as_u64) else {
            warn!("host reply without a numeric hostReply id");
            return false;
        };
        let Some(waiter) = self.take_pending(call_id) else {
            debug!(call_id, "no pending host call for reply");
            return false;
        };
        let reply = match message.get("error") {
            Some(Value::String(err)) => Err(err.clone()),
            Some(err) if !err.is_null() => Err(err.to_string()),
            _ => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        waiter.send(reply).is_ok()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn take_pending(&self, call_id: u64) -> Option<oneshot::Sender<Reply>> {
        self.pending.lock().ok()?.remove(&call_id)
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T, HostError> {
        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| HostError::Disconnected)?
            .insert(call_id, tx);

        let request = json!({"hostCall": call_id, "method": method, "params": params});
        if self.outbound.send(request).is_err() {
            self.take_pending(call_id);
            return Err(HostError::Disconnected);
        }

        let reply = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(HostError::Disconnected),
            Err(_) => {
                self.take_pending(call_id);
                warn!(call_id, method, "host call timed out");
                return Err(HostError::Timeout(self.timeout.as_millis() as u64));
            }
        };
        let result = reply.map_err(HostError::Rejected)?;
        serde_json::from_value(result)
            .map_err(|e| HostError::Rejected(format!("malformed {} result: {}", method, e)))
    }
}

#[async_trait]
impl TabPlatform for HostBridge {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<LiveTab>, HostError> {
        self.call("tabs.query", json!(query)).await
    }

    async fn get_tab(&self, tab_id: TabHandle) -> Result<LiveTab, HostError> {
        self.call("tabs.get", json!({"tabId": tab_id})).await
    }

    async fn create_tab(&self, props: CreateProperties) -> Result<LiveTab, HostError> {
        self.call("tabs.create", json!(props)).await
    }

    async fn update_tab(&self, tab_id: TabHandle, props: UpdateProperties) -> Result<LiveTab, HostError> {
        self.call("tabs.update", json!({"tabId": tab_id, "properties": props})).await
    }

    async fn move_tab(&self, tab_id: TabHandle, index: usize) -> Result<LiveTab, HostError> {
        self.call("tabs.move", json!({"tabId": tab_id, "index": index})).await
    }

    async fn remove_tabs(&self, tab_ids: &[TabHandle]) -> Result<(), HostError> {
        self.call::<Value>("tabs.remove", json!({"tabIds": tab_ids})).await.map(|_| ())
    }

    async fn get_current_window(&self) -> Result<WindowId, HostError> {
        self.call("windows.getCurrent", json!({})).await
    }
}
