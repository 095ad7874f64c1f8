//! Per-workload watcher — owns one workload's live instance metrics.
//!
//! A `Watcher` runs a single event loop over three sources: the
//! workload's envelope stream, that stream's error channel, and a control
//! channel fed by discovery. It is the only code that touches its
//! `InstanceMetricSet`s, so no locking is needed.
//!
//! Closing the control channel asks the watcher to stop: it releases all
//! instance metrics and returns `Ok(())`. Any stream ending or error
//! returns `Err`.

use prometheus::Registry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use appwatch_core::{
    ContainerMetric, Envelope, EventStream, EventStreamProvider, HttpStartStop, LogMessage,
    WorkloadIdentity, WorkloadSnapshot,
};
use appwatch_metrics::{InstanceMetricSet, ScopedRegistry};

use crate::crash_log::parse_exit;
use crate::error::WatcherError;

/// Default capacity of a watcher's control channel.
pub const DEFAULT_CONTROL_BUFFER: usize = 5;

/// Discovery's handle for steering a running watcher.
#[derive(Debug)]
pub struct WatcherControl {
    identity: WorkloadIdentity,
    tx: mpsc::Sender<u32>,
}

impl WatcherControl {
    /// Push a new instance count. Waits only if the channel buffer is full.
    pub async fn update_instances(&self, instances: u32) {
        if self.tx.send(instances).await.is_err() {
            warn!(guid = %self.identity, instances, "watcher is no longer running");
        }
    }

    /// Ask the watcher to release its metrics and exit.
    pub fn close(self) {
        debug!(guid = %self.identity, "closing watcher");
    }
}

/// Event loop state for a single workload.
pub struct Watcher<P> {
    identity: WorkloadIdentity,
    instances: Vec<InstanceMetricSet>,
    control: mpsc::Receiver<u32>,
    scope: ScopedRegistry,
    provider: P,
}

impl<P: EventStreamProvider> Watcher<P> {
    /// Create a watcher with metrics registered for the snapshot's current
    /// instance count.
    pub fn new(
        snapshot: &WorkloadSnapshot,
        registry: &Registry,
        provider: P,
        buffer: usize,
    ) -> Result<(Self, WatcherControl), WatcherError> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let scope = ScopedRegistry::for_workload(registry, &snapshot.identity, &snapshot.metadata);

        let mut watcher = Self {
            identity: snapshot.identity.clone(),
            instances: Vec::new(),
            control: rx,
            scope,
            provider,
        };
        if let Err(e) = watcher.scale_to(snapshot.instances) {
            watcher.shrink_to(0);
            return Err(e);
        }

        info!(
            guid = %snapshot.identity,
            app = %snapshot.metadata.name,
            instances = snapshot.instances,
            "watcher created"
        );

        let control = WatcherControl {
            identity: snapshot.identity.clone(),
            tx,
        };
        Ok((watcher, control))
    }

    /// Number of instances with registered metrics.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Consume the event stream until closed or failed.
    ///
    /// Metrics are released on every exit path.
    pub async fn run(mut self) -> Result<(), WatcherError> {
        let stream = self.provider.start();
        let result = self.event_loop(stream).await;
        self.provider.close();

        if let Err(e) = &result {
            warn!(guid = %self.identity, error = %e, "watcher stopped with error");
            self.shrink_to(0);
        } else {
            info!(guid = %self.identity, "watcher stopped");
        }
        result
    }

    async fn event_loop(&mut self, mut stream: EventStream) -> Result<(), WatcherError> {
        loop {
            tokio::select! {
                envelope = stream.envelopes.recv() => match envelope {
                    Some(envelope) => self.handle_envelope(envelope)?,
                    None => {
                        // A provider reports its failure before hanging up.
                        if let Ok(e) = stream.errors.try_recv() {
                            return Err(e.into());
                        }
                        return Err(WatcherError::EnvelopeStreamClosed(self.identity.clone()));
                    }
                },
                error = stream.errors.recv() => match error {
                    Some(e) => return Err(e.into()),
                    None => return Err(WatcherError::ErrorStreamClosed(self.identity.clone())),
                },
                instances = self.control.recv() => match instances {
                    Some(count) => self.scale_to(count)?,
                    None => {
                        self.scale_to(0)?;
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Apply one envelope to the instance metrics.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), WatcherError> {
        match envelope {
            Envelope::ContainerMetric(metric) => self.handle_container_metric(&metric),
            Envelope::LogMessage(log) => self.handle_log_message(&log)?,
            Envelope::HttpStartStop(http) => self.handle_http_start_stop(&http),
            Envelope::Other => {}
        }
        Ok(())
    }

    fn handle_container_metric(&self, metric: &ContainerMetric) {
        // Out of range: the instance may have just been descheduled.
        if let Some(instance) = self.instance(metric.instance_index as usize) {
            instance.record_usage(metric);
        }
    }

    fn handle_log_message(&self, log: &LogMessage) -> Result<(), WatcherError> {
        let Some(exit) = parse_exit(log)? else {
            return Ok(());
        };
        if !exit.is_crash() {
            return Ok(());
        }
        if let Some(instance) = exit.instance_index().and_then(|index| self.instance(index)) {
            debug!(guid = %self.identity, instance = exit.index, "instance crashed");
            instance.record_crash();
        }
        Ok(())
    }

    fn handle_http_start_stop(&self, http: &HttpStartStop) {
        if let Some(instance) = self.instance(http.instance_index as usize) {
            instance.record_request(&http.status_range(), http.duration_secs());
        }
    }

    fn instance(&self, index: usize) -> Option<&InstanceMetricSet> {
        self.instances.get(index)
    }

    /// Resize the tracked instances so exactly `[0, count)` are registered.
    pub fn scale_to(&mut self, count: u32) -> Result<(), WatcherError> {
        let target = count as usize;
        let current = self.instances.len();
        if target == current {
            return Ok(());
        }

        debug!(guid = %self.identity, from = current, to = target, "scaling instance metrics");
        if target > current {
            for index in current..target {
                let set = InstanceMetricSet::register(index as u32, &self.scope)?;
                self.instances.push(set);
            }
        } else {
            self.shrink_to(target);
        }
        Ok(())
    }

    fn shrink_to(&mut self, target: usize) {
        while self.instances.len() > target {
            if let Some(set) = self.instances.pop() {
                set.unregister();
            }
        }
    }
}
