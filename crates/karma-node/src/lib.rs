//! # karma-node: RocksDB storage, configuration and service wiring.
//!
//! - [`storage::RocksStore`]: persistent ledger backed by RocksDB
//! - [`service::KarmaService`]: ledger, reporting and reward gate over one store
//! - [`config::NodeConfig`]: layered configuration

pub mod config;
pub mod service;
pub mod storage;

pub use config::{NodeConfig, StoreKind};
pub use service::KarmaService;
pub use storage::RocksStore;
