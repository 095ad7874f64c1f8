//! Discovery — keeps one watcher per running workload.
//!
//! Every poll interval the inventory is fetched and diffed against the
//! workloads already being watched:
//!
//! - new running workload → create a watcher
//! - known, same metadata → push the current instance count
//! - known, metadata changed → remove the old watcher, create a new one
//! - no longer running or gone → remove the watcher
//!
//! `Discovery` is owned by the poll loop task and is the only mutator of
//! its maps. Watchers run on their own tasks and report failures back
//! over an internal channel; any failure ends [`Discovery::run`].

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use prometheus::Registry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use appwatch_core::{
    InventoryClient, StreamConnector, WorkloadIdentity, WorkloadMetadata, WorkloadSnapshot,
};

use crate::error::{DiscoveryError, DiscoveryResult, WatcherError};
use crate::watcher::{DEFAULT_CONTROL_BUFFER, Watcher, WatcherControl};

/// A running watcher task.
struct WatcherHandle {
    control: WatcherControl,
    task: JoinHandle<()>,
    generation: u64,
}

/// A watcher task that exited with an error.
#[derive(Debug)]
struct WatcherFailure {
    identity: WorkloadIdentity,
    generation: u64,
    source: WatcherError,
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Watchers created for newly running workloads.
    pub created: usize,
    /// Watchers replaced because the workload's metadata changed.
    pub recreated: usize,
    /// Instance counts pushed to existing watchers.
    pub updated: usize,
    /// Watchers removed for stopped or deleted workloads.
    pub removed: usize,
}

/// Reconciles watchers against the platform inventory.
pub struct Discovery<C, S> {
    client: C,
    connector: S,
    registry: Registry,
    poll_interval: Duration,
    control_buffer: usize,
    metadata_by_identity: HashMap<WorkloadIdentity, WorkloadMetadata>,
    watchers: HashMap<WorkloadIdentity, WatcherHandle>,
    next_generation: u64,
    failures_tx: mpsc::UnboundedSender<WatcherFailure>,
    failures_rx: mpsc::UnboundedReceiver<WatcherFailure>,
}

impl<C, S> Discovery<C, S>
where
    C: InventoryClient,
    S: StreamConnector,
{
    pub fn new(client: C, connector: S, registry: Registry, poll_interval: Duration) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            client,
            connector,
            registry,
            poll_interval,
            control_buffer: DEFAULT_CONTROL_BUFFER,
            metadata_by_identity: HashMap::new(),
            watchers: HashMap::new(),
            next_generation: 0,
            failures_tx,
            failures_rx,
        }
    }

    /// Set the capacity of each watcher's control channel.
    pub fn with_control_buffer(mut self, buffer: usize) -> Self {
        self.control_buffer = buffer;
        self
    }

    /// Run the poll loop until shutdown or a fatal error.
    ///
    /// Every watcher is closed, and has released its metrics, before this returns.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DiscoveryResult<()> {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "discovery started"
        );

        let result = loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    debug!("checking for new workloads");
                    if let Err(e) = self.reconcile().await {
                        error!(error = %e, "reconciliation failed");
                        break Err(e);
                    }
                }
                Some(failure) = self.failures_rx.recv() => {
                    if self.is_current(&failure) {
                        error!(guid = %failure.identity, error = %failure.source, "watcher failed");
                        break Err(DiscoveryError::WatcherFailed {
                            identity: failure.identity,
                            source: failure.source,
                        });
                    }
                    debug!(guid = %failure.identity, error = %failure.source, "ignoring failure of retired watcher");
                }
                _ = shutdown.changed() => {
                    info!("discovery shutting down");
                    break Ok(());
                }
            }
        };

        self.close_all().await;
        result
    }

    /// Fetch the inventory once and converge the watchers onto it.
    pub async fn reconcile(&mut self) -> DiscoveryResult<ReconcileSummary> {
        let workloads = self.client.list_workloads().await?;

        let mut summary = ReconcileSummary::default();
        let mut running = HashSet::new();

        for snapshot in workloads.iter().filter(|w| w.is_running()) {
            running.insert(snapshot.identity.clone());

            let unchanged = self
                .metadata_by_identity
                .get(&snapshot.identity)
                .map(|known| *known == snapshot.metadata);

            match unchanged {
                None => {
                    self.create_watcher(snapshot)?;
                    summary.created += 1;
                }
                Some(false) => {
                    info!(guid = %snapshot.identity, "workload metadata changed, recreating watcher");
                    self.remove_watcher(&snapshot.identity).await;
                    self.create_watcher(snapshot)?;
                    summary.recreated += 1;
                }
                Some(true) => {
                    if let Some(handle) = self.watchers.get(&snapshot.identity) {
                        handle.control.update_instances(snapshot.instances).await;
                    }
                    summary.updated += 1;
                }
            }
        }

        let gone: Vec<WorkloadIdentity> = self
            .metadata_by_identity
            .keys()
            .filter(|identity| !running.contains(*identity))
            .cloned()
            .collect();
        for identity in gone {
            self.remove_watcher(&identity).await;
            summary.removed += 1;
        }

        debug!(
            workloads = workloads.len(),
            running = running.len(),
            created = summary.created,
            recreated = summary.recreated,
            removed = summary.removed,
            "reconciliation complete"
        );
        Ok(summary)
    }

    /// Close every watcher and wait for each to release its metrics.
    pub async fn close_all(&mut self) {
        self.metadata_by_identity.clear();
        for (identity, handle) in self.watchers.drain() {
            handle.control.close();
            if let Err(e) = handle.task.await {
                error!(guid = %identity, error = %e, "watcher task panicked");
            }
        }
    }

    /// Identities that currently have a watcher, sorted.
    pub fn watched(&self) -> Vec<WorkloadIdentity> {
        let mut identities: Vec<_> = self.watchers.keys().cloned().collect();
        identities.sort();
        identities
    }

    pub fn is_watching(&self, identity: &WorkloadIdentity) -> bool {
        self.watchers.contains_key(identity)
    }

    /// Metadata the workload's watcher was created with.
    pub fn metadata(&self, identity: &WorkloadIdentity) -> Option<&WorkloadMetadata> {
        self.metadata_by_identity.get(identity)
    }

    fn create_watcher(&mut self, snapshot: &WorkloadSnapshot) -> DiscoveryResult<()> {
        let provider = self.connector.connect(&snapshot.identity);
        let (watcher, control) =
            Watcher::new(snapshot, &self.registry, provider, self.control_buffer).map_err(
                |source| DiscoveryError::CreateWatcher {
                    identity: snapshot.identity.clone(),
                    source,
                },
            )?;

        self.next_generation += 1;
        let generation = self.next_generation;
        let identity = snapshot.identity.clone();
        let failures = self.failures_tx.clone();
        let task = tokio::spawn(async move {
            if let Err(source) = watcher.run().await {
                let _ = failures.send(WatcherFailure {
                    identity,
                    generation,
                    source,
                });
            }
        });

        self.watchers.insert(
            snapshot.identity.clone(),
            WatcherHandle {
                control,
                task,
                generation,
            },
        );
        self.metadata_by_identity
            .insert(snapshot.identity.clone(), snapshot.metadata.clone());
        Ok(())
    }

    /// Close a watcher and wait for it to release its metrics, so a
    /// replacement with the same labels can register.
    async fn remove_watcher(&mut self, identity: &WorkloadIdentity) {
        self.metadata_by_identity.remove(identity);
        if let Some(handle) = self.watchers.remove(identity) {
            handle.control.close();
            if let Err(e) = handle.task.await {
                error!(guid = %identity, error = %e, "watcher task panicked");
            }
            info!(guid = %identity, "watcher removed");
        }
    }

    fn is_current(&self, failure: &WatcherFailure) -> bool {
        self.watchers
            .get(&failure.identity)
            .is_some_and(|handle| handle.generation == failure.generation)
    }
}
