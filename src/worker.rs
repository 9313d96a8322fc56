//! Off-thread layout with sequence-numbered messages.
//!
//! Only JSON strings cross the thread boundary. The same
//! [`handle_message`] runs on the native worker thread and behind the wasm
//! entry point.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LayoutConfig;
use crate::graph::{GraphEdge, GraphModel};
use crate::ir::{Direction, NodeDefinition};
use crate::layout::{DefaultSizer, Layout, LayoutCache, LayoutKey, compute_layout};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("layout worker is not running")]
    Disconnected,
    #[error("timed out waiting for layout")]
    Timeout,
    #[error("failed to encode layout message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode layout message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("layout failed: {0}")]
    Layout(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    pub seq: u64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub expanded_group_ids: Vec<String>,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutOutcome {
    Layout(Layout),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutResponse {
    pub seq: u64,
    #[serde(flatten)]
    pub outcome: LayoutOutcome,
}

pub const CYCLE_MESSAGE: &str = "cycle detected in graph";

/// Runs one request with the default configuration.
pub fn handle_message(json: &str) -> String {
    handle_message_with(json, &LayoutConfig::default())
}

pub fn handle_message_with(json: &str, config: &LayoutConfig) -> String {
    let response = match serde_json::from_str::<LayoutRequest>(json) {
        Ok(request) => run_request(request, config),
        Err(err) => LayoutResponse {
            seq: salvage_seq(json),
            outcome: LayoutOutcome::Error(format!("invalid request: {err}")),
        },
    };
    serde_json::to_string(&response).unwrap_or_else(|err| {
        format!(
            r#"{{"seq":{},"error":"failed to encode response: {}"}}"#,
            response.seq,
            err.to_string().replace('"', "'")
        )
    })
}

/// Best-effort sequence number from a request that failed to parse, so the
/// error still reaches the right caller.
fn salvage_seq(json: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|value| value.get("seq").and_then(serde_json::Value::as_u64))
        .unwrap_or(0)
}

fn run_request(request: LayoutRequest, config: &LayoutConfig) -> LayoutResponse {
    let seq = request.seq;
    let model = match GraphModel::from_wire(&request.nodes, &request.edges) {
        Ok(model) => model,
        Err(err) => {
            return LayoutResponse {
                seq,
                outcome: LayoutOutcome::Error(err.to_string()),
            };
        }
    };
    if model.has_cycles() {
        return LayoutResponse {
            seq,
            outcome: LayoutOutcome::Error(CYCLE_MESSAGE.to_string()),
        };
    }
    let expanded: BTreeSet<String> = request.expanded_group_ids.into_iter().collect();
    let sizer = DefaultSizer::new(config.sizer.clone());
    let layout = compute_layout(&model, request.direction, &expanded, &sizer, config);
    LayoutResponse {
        seq,
        outcome: LayoutOutcome::Layout(layout),
    }
}

/// Background thread answering layout requests in arrival order.
pub struct LayoutWorker {
    requests: Option<Sender<String>>,
    responses: Receiver<String>,
    handle: Option<JoinHandle<()>>,
}

impl LayoutWorker {
    pub fn spawn(config: LayoutConfig) -> Self {
        Self::spawn_with(move |message| handle_message_with(message, &config))
    }

    /// Runs `handler` on the worker thread for every request message.
    pub fn spawn_with<F>(handler: F) -> Self
    where
        F: Fn(&str) -> String + Send + 'static,
    {
        let (req_tx, req_rx) = channel::<String>();
        let (res_tx, res_rx) = channel::<String>();

        let handle = thread::spawn(move || {
            tracing::info!("layout worker started");
            while let Ok(message) = req_rx.recv() {
                let started = Instant::now();
                let reply = handler(&message);
                tracing::debug!(
                    request_bytes = message.len(),
                    reply_bytes = reply.len(),
                    elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                    "layout worker answered request"
                );
                if res_tx.send(reply).is_err() {
                    break;
                }
            }
            tracing::info!("layout worker stopped");
        });

        Self {
            requests: Some(req_tx),
            responses: res_rx,
            handle: Some(handle),
        }
    }

    pub fn send(&self, message: String) -> Result<(), WorkerError> {
        let requests = self.requests.as_ref().ok_or(WorkerError::Disconnected)?;
        requests.send(message).map_err(|_| WorkerError::Disconnected)
    }

    pub fn try_recv(&self) -> Option<String> {
        self.responses.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, WorkerError> {
        self.responses.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WorkerError::Timeout,
            RecvTimeoutError::Disconnected => WorkerError::Disconnected,
        })
    }
}

impl Drop for LayoutWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Served from the cache and applied immediately.
    Cached(u64),
    /// Sent to the worker; the reply will carry this seq.
    Sent(u64),
}

impl Dispatch {
    pub fn seq(self) -> u64 {
        match self {
            Self::Cached(seq) | Self::Sent(seq) => seq,
        }
    }
}

/// UI-side end of the worker. Only the reply to the most recent request is
/// applied; older replies are cached but otherwise ignored.
pub struct LayoutBridge {
    worker: LayoutWorker,
    cache: LayoutCache,
    latest_issued: u64,
    latest_applied: u64,
    pending: HashMap<u64, LayoutKey>,
    current: Option<Arc<Layout>>,
    /// Error reported for the latest applied seq, if it failed.
    failure: Option<String>,
}

impl LayoutBridge {
    pub fn new(worker: LayoutWorker, cache: LayoutCache) -> Self {
        Self {
            worker,
            cache,
            latest_issued: 0,
            latest_applied: 0,
            pending: HashMap::new(),
            current: None,
            failure: None,
        }
    }

    pub fn request(
        &mut self,
        model: &GraphModel,
        direction: Direction,
        expanded: &BTreeSet<String>,
    ) -> Result<Dispatch, WorkerError> {
        self.latest_issued += 1;
        let seq = self.latest_issued;
        let key = LayoutKey::new(model, direction, expanded);

        if let Some(layout) = self.cache.get(key) {
            tracing::debug!(seq, "layout served from cache");
            self.latest_applied = seq;
            self.current = Some(layout);
            self.failure = None;
            return Ok(Dispatch::Cached(seq));
        }

        let (nodes, edges) = model.to_wire();
        let request = LayoutRequest {
            seq,
            direction,
            expanded_group_ids: expanded.iter().cloned().collect(),
            nodes,
            edges,
        };
        let message = serde_json::to_string(&request).map_err(WorkerError::Encode)?;
        self.worker.send(message)?;
        self.pending.insert(seq, key);
        Ok(Dispatch::Sent(seq))
    }

    /// Handles one worker reply. Returns the layout when it became current.
    pub fn accept(&mut self, message: &str) -> Result<Option<Arc<Layout>>, WorkerError> {
        let response: LayoutResponse = serde_json::from_str(message).map_err(WorkerError::Decode)?;
        let seq = response.seq;
        let key = self.pending.remove(&seq);
        let is_latest = seq == self.latest_issued && seq > self.latest_applied;

        match response.outcome {
            LayoutOutcome::Layout(layout) => {
                let layout = Arc::new(layout);
                if let Some(key) = key {
                    self.cache.insert(key, Arc::clone(&layout));
                }
                if !is_latest {
                    tracing::debug!(seq, latest = self.latest_issued, "discarding stale layout");
                    return Ok(None);
                }
                self.latest_applied = seq;
                self.current = Some(Arc::clone(&layout));
                self.failure = None;
                Ok(Some(layout))
            }
            LayoutOutcome::Error(message) => {
                if !is_latest {
                    tracing::debug!(seq, latest = self.latest_issued, "discarding stale layout error");
                    return Ok(None);
                }
                self.latest_applied = seq;
                self.failure = Some(message.clone());
                Err(WorkerError::Layout(message))
            }
        }
    }

    /// Drains every reply that has arrived.
    pub fn poll(&mut self) -> Result<Option<Arc<Layout>>, WorkerError> {
        let mut applied = None;
        while let Some(message) = self.worker.try_recv() {
            if let Some(layout) = self.accept(&message)? {
                applied = Some(layout);
            }
        }
        Ok(applied)
    }

    /// Blocks until the latest request is answered. Fails with the worker's
    /// error when that answer was an error, even if an older layout is still
    /// current.
    pub fn wait(&mut self, timeout: Duration) -> Result<Arc<Layout>, WorkerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.latest_applied == self.latest_issued {
                if let Some(message) = &self.failure {
                    return Err(WorkerError::Layout(message.clone()));
                }
                if let Some(layout) = &self.current {
                    return Ok(Arc::clone(layout));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WorkerError::Timeout);
            }
            let message = self.worker.recv_timeout(remaining)?;
            self.accept(&message)?;
        }
    }

    pub fn current(&self) -> Option<Arc<Layout>> {
        self.current.clone()
    }

    pub fn latest_issued(&self) -> u64 {
        self.latest_issued
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RawNode;

    fn chain(len: usize) -> GraphModel {
        let raw: Vec<RawNode> = (0..len)
            .map(|i| {
                let name = format!("n{i}");
                let node = RawNode::asset(&[name.as_str()]);
                if i + 1 < len {
                    node.with_downstream(&[format!("n{}", i + 1).as_str()])
                } else {
                    node
                }
            })
            .collect();
        GraphModel::build(&raw).unwrap()
    }

    fn reply(seq: u64) -> String {
        sized_reply(seq, 0.0)
    }

    fn sized_reply(seq: u64, width: f64) -> String {
        serde_json::to_string(&LayoutResponse {
            seq,
            outcome: LayoutOutcome::Layout(Layout {
                width,
                ..Layout::default()
            }),
        })
        .unwrap()
    }

    /// Bridge over a worker whose own replies are never read; tests feed
    /// replies through `accept`.
    fn detached_bridge() -> LayoutBridge {
        LayoutBridge::new(LayoutWorker::spawn_with(|_| String::new()), LayoutCache::new(8))
    }

    #[test]
    fn handler_lays_out_wire_requests() {
        let request = r#"{
            "seq": 9,
            "direction": "down",
            "nodes": [
                {"kind": "asset", "assetKey": {"path": ["a"]}},
                {"kind": "asset", "assetKey": {"path": ["b"]}}
            ],
            "edges": [{"from": "a", "to": "b"}]
        }"#;
        let response: LayoutResponse = serde_json::from_str(&handle_message(request)).unwrap();
        assert_eq!(response.seq, 9);
        let LayoutOutcome::Layout(layout) = response.outcome else {
            panic!("expected a layout");
        };
        assert!(layout.nodes["a"].bounds.bottom() < layout.nodes["b"].bounds.y);
    }

    #[test]
    fn handler_reports_cycles_and_bad_input() {
        let cyclic = r#"{
            "seq": 2,
            "nodes": [
                {"kind": "asset", "assetKey": {"path": ["a"]}},
                {"kind": "asset", "assetKey": {"path": ["b"]}}
            ],
            "edges": [{"from": "a", "to": "b"}, {"from": "b", "to": "a"}]
        }"#;
        let response: LayoutResponse = serde_json::from_str(&handle_message(cyclic)).unwrap();
        assert_eq!(response.outcome, LayoutOutcome::Error(CYCLE_MESSAGE.to_string()));

        let broken: LayoutResponse = serde_json::from_str(&handle_message(r#"{"seq": 4, "nodes": 1}"#)).unwrap();
        assert_eq!(broken.seq, 4);
        assert!(matches!(broken.outcome, LayoutOutcome::Error(_)));
    }

    #[test]
    fn response_wire_shape() {
        let value: serde_json::Value = serde_json::from_str(&reply(3)).unwrap();
        assert_eq!(value["seq"], 3);
        assert!(value.get("layout").is_some());
    }

    #[test]
    fn stale_replies_are_discarded() {
        let mut bridge = detached_bridge();
        let none = BTreeSet::new();
        for len in 1..=5 {
            bridge.request(&chain(len), Direction::Down, &none).unwrap();
        }
        assert_eq!(bridge.latest_issued(), 5);

        let fresh = bridge.accept(&sized_reply(5, 500.0)).unwrap().unwrap();
        assert_eq!(fresh.width, 500.0);
        assert!(bridge.accept(&sized_reply(3, 300.0)).unwrap().is_none());
        assert!(Arc::ptr_eq(&bridge.current().unwrap(), &fresh));
        assert!(bridge.accept(&sized_reply(5, 999.0)).unwrap().is_none());
        assert_eq!(bridge.current().unwrap().width, 500.0);
    }

    #[test]
    fn failed_latest_request_is_not_reported_as_fresh() {
        let mut bridge = detached_bridge();
        let none = BTreeSet::new();
        bridge.request(&chain(1), Direction::Down, &none).unwrap();
        let first = bridge.accept(&reply(1)).unwrap().unwrap();

        assert_eq!(bridge.request(&chain(2), Direction::Down, &none).unwrap(), Dispatch::Sent(2));
        let failure = serde_json::to_string(&LayoutResponse {
            seq: 2,
            outcome: LayoutOutcome::Error(CYCLE_MESSAGE.to_string()),
        })
        .unwrap();
        assert!(matches!(bridge.accept(&failure), Err(WorkerError::Layout(_))));
        assert!(Arc::ptr_eq(&bridge.current().unwrap(), &first));
        for _ in 0..2 {
            assert!(matches!(
                bridge.wait(Duration::from_millis(10)),
                Err(WorkerError::Layout(message)) if message == CYCLE_MESSAGE
            ));
        }
    }

    #[test]
    fn worker_round_trip_and_cache() {
        let mut bridge = LayoutBridge::new(LayoutWorker::spawn(LayoutConfig::default()), LayoutCache::new(8));
        let model = chain(3);
        let none = BTreeSet::new();
        let first = bridge.request(&model, Direction::Down, &none).unwrap();
        assert_eq!(first, Dispatch::Sent(1));
        let layout = bridge.wait(Duration::from_secs(30)).unwrap();
        assert_eq!(layout.nodes.len(), 3);

        let again = bridge.request(&model, Direction::Down, &none).unwrap();
        assert_eq!(again, Dispatch::Cached(2));
        assert!(Arc::ptr_eq(&bridge.current().unwrap(), &layout));
    }
}
