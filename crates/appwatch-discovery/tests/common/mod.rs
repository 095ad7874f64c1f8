//! In-memory fakes for the platform collaborators.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prometheus::Registry;
use tokio::sync::mpsc;

use appwatch_core::{
    Envelope, EventStream, EventStreamProvider, InventoryClient, InventoryError, RunningState,
    StreamConnector, StreamError, WorkloadIdentity, WorkloadMetadata, WorkloadSnapshot,
};
use appwatch_metrics::samples;

pub const GUID: &str = "33333333-3333-3333-3333-333333333333";

pub fn workload(guid: &str, name: &str, instances: u32, state: RunningState) -> WorkloadSnapshot {
    WorkloadSnapshot {
        identity: guid.into(),
        metadata: WorkloadMetadata {
            name: name.to_string(),
            namespace: "spacename".to_string(),
            organization: "orgname".to_string(),
        },
        instances,
        state,
    }
}

pub fn running(guid: &str, name: &str, instances: u32) -> WorkloadSnapshot {
    workload(guid, name, instances, RunningState::Running)
}

pub fn stopped(guid: &str, name: &str, instances: u32) -> WorkloadSnapshot {
    workload(guid, name, instances, RunningState::Stopped)
}

// ── Inventory ──────────────────────────────────────────────────────

type Response = Result<Vec<WorkloadSnapshot>, String>;

struct InventoryInner {
    scripted: Mutex<VecDeque<Response>>,
    fallback: Mutex<Response>,
    calls: AtomicUsize,
}

/// Returns scripted responses in order, then the fallback forever.
#[derive(Clone)]
pub struct FakeInventory {
    inner: Arc<InventoryInner>,
}

impl FakeInventory {
    pub fn returning(workloads: Vec<WorkloadSnapshot>) -> Self {
        Self {
            inner: Arc::new(InventoryInner {
                scripted: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(Ok(workloads)),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn failing(message: &str) -> Self {
        let inventory = Self::returning(Vec::new());
        *inventory.inner.fallback.lock().unwrap() = Err(message.to_string());
        inventory
    }

    /// Queue a one-off response ahead of the fallback.
    pub fn then(self, workloads: Vec<WorkloadSnapshot>) -> Self {
        self.inner.scripted.lock().unwrap().push_back(Ok(workloads));
        self
    }

    /// Replace the fallback response.
    pub fn set(&self, workloads: Vec<WorkloadSnapshot>) {
        *self.inner.fallback.lock().unwrap() = Ok(workloads);
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

impl InventoryClient for FakeInventory {
    async fn list_workloads(&self) -> Result<Vec<WorkloadSnapshot>, InventoryError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.inner.scripted.lock().unwrap().pop_front();
        let response = match next {
            Some(response) => response,
            None => self.inner.fallback.lock().unwrap().clone(),
        };
        response.map_err(InventoryError::Request)
    }
}

// ── Streams ────────────────────────────────────────────────────────

/// Observation point for one provider handed out by the connector.
pub struct ProviderProbe {
    pub identity: WorkloadIdentity,
    starts: AtomicUsize,
    closes: AtomicUsize,
    envelopes: Mutex<Option<mpsc::Sender<Envelope>>>,
    errors: Mutex<Option<mpsc::Sender<StreamError>>>,
}

impl ProviderProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn envelopes(&self) -> Option<mpsc::Sender<Envelope>> {
        self.envelopes.lock().unwrap().clone()
    }

    /// Drop the stream's sending halves, ending the subscription.
    pub fn end_stream(&self) {
        self.envelopes.lock().unwrap().take();
        self.errors.lock().unwrap().take();
    }

    pub async fn fail(&self, error: StreamError) {
        let sender = self.errors.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(error).await;
        }
    }
}

pub struct FakeProvider {
    probe: Arc<ProviderProbe>,
}

impl EventStreamProvider for FakeProvider {
    fn start(&mut self) -> EventStream {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        let (envelopes_tx, envelopes) = mpsc::channel(16);
        let (errors_tx, errors) = mpsc::channel(16);
        *self.probe.envelopes.lock().unwrap() = Some(envelopes_tx);
        *self.probe.errors.lock().unwrap() = Some(errors_tx);
        EventStream { envelopes, errors }
    }

    fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`FakeProvider`]s and remembers each one.
#[derive(Clone, Default)]
pub struct FakeConnector {
    probes: Arc<Mutex<Vec<Arc<ProviderProbe>>>>,
}

impl FakeConnector {
    pub fn providers(&self) -> Vec<Arc<ProviderProbe>> {
        self.probes.lock().unwrap().clone()
    }

    pub fn provider(&self, index: usize) -> Arc<ProviderProbe> {
        self.providers()[index].clone()
    }

    pub fn count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }
}

impl StreamConnector for FakeConnector {
    type Provider = FakeProvider;

    fn connect(&self, identity: &WorkloadIdentity) -> FakeProvider {
        let probe = Arc::new(ProviderProbe {
            identity: identity.clone(),
            starts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            envelopes: Mutex::new(None),
            errors: Mutex::new(None),
        });
        self.probes.lock().unwrap().push(probe.clone());
        FakeProvider { probe }
    }
}

// ── Assertions ─────────────────────────────────────────────────────

/// Instance labels registered for `metric`, restricted to one app name.
pub fn instances_for_app(registry: &Registry, app: &str) -> BTreeSet<String> {
    samples(registry)
        .into_iter()
        .filter(|s| s.name == "cpu" && s.label("app") == Some(app))
        .filter_map(|s| s.label("instance").map(str::to_string))
        .collect()
}

pub fn indices(count: u32) -> BTreeSet<String> {
    (0..count).map(|i| i.to_string()).collect()
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Assert `check` keeps holding for `window`.
pub async fn consistently(window: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + window;
    while tokio::time::Instant::now() < deadline {
        assert!(check(), "condition stopped holding");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
