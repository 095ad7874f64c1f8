//! Traits for the platform collaborators the exporter consumes.
//!
//! The daemon wires HTTP implementations; tests substitute in-memory fakes.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{InventoryError, StreamError};
use crate::types::{Envelope, WorkloadIdentity, WorkloadSnapshot};

/// Lists every workload the platform knows about, running or not.
pub trait InventoryClient: Send + Sync {
    fn list_workloads(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkloadSnapshot>, InventoryError>> + Send;
}

/// The two receiving halves handed out by [`EventStreamProvider::start`].
///
/// Either channel closing means the subscription has ended.
#[derive(Debug)]
pub struct EventStream {
    pub envelopes: mpsc::Receiver<Envelope>,
    pub errors: mpsc::Receiver<StreamError>,
}

/// A subscription to one workload's telemetry.
pub trait EventStreamProvider: Send + 'static {
    /// Begin streaming. Called once per provider.
    fn start(&mut self) -> EventStream;

    /// Terminate the subscription.
    fn close(&mut self);
}

/// Builds an [`EventStreamProvider`] for a workload.
pub trait StreamConnector: Send + Sync {
    type Provider: EventStreamProvider;

    fn connect(&self, identity: &WorkloadIdentity) -> Self::Provider;
}
