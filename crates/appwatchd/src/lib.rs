//! appwatchd — the appwatch daemon.
//!
//! Wires the discovery loop to the platform over HTTP and serves the
//! shared metrics registry:
//! - [`config`]: TOML file + CLI overrides
//! - [`client`]: bare hyper HTTP/1.1 `GET`
//! - [`inventory`]: `InventoryClient` over the platform's workload listing
//! - [`stream`]: per-workload newline-delimited JSON envelope streams
//! - [`server`]: `/metrics` and `/health`

pub mod client;
pub mod config;
pub mod inventory;
pub mod server;
pub mod stream;

pub use config::{Config, LogFormat};
pub use inventory::HttpInventoryClient;
pub use server::build_router;
pub use stream::{HttpStreamConnector, HttpStreamProvider};
