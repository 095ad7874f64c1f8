//! HTTP inventory client.

use std::time::Duration;

use http::Uri;
use http_body_util::BodyExt;
use tracing::debug;

use appwatch_core::{InventoryClient, InventoryError, WorkloadSnapshot};

use crate::client;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lists workloads with a `GET` returning a JSON array of snapshots.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    uri: Uri,
}

impl HttpInventoryClient {
    pub fn new(uri: Uri) -> Self {
        Self { uri }
    }

    async fn fetch(&self) -> Result<Vec<WorkloadSnapshot>, InventoryError> {
        let response = client::get(&self.uri)
            .await
            .map_err(|e| InventoryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InventoryError::Status(status.as_u16()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| InventoryError::Request(e.to_string()))?
            .to_bytes();

        decode_inventory(&body)
    }
}

impl InventoryClient for HttpInventoryClient {
    async fn list_workloads(&self) -> Result<Vec<WorkloadSnapshot>, InventoryError> {
        let workloads = tokio::time::timeout(REQUEST_TIMEOUT, self.fetch())
            .await
            .map_err(|_| InventoryError::Request(format!("timed out after {REQUEST_TIMEOUT:?}")))??;

        debug!(uri = %self.uri, workloads = workloads.len(), "inventory fetched");
        Ok(workloads)
    }
}

/// Decode an inventory response body.
pub fn decode_inventory(body: &[u8]) -> Result<Vec<WorkloadSnapshot>, InventoryError> {
    serde_json::from_slice(body).map_err(|e| InventoryError::Decode(e.to_string()))
}
