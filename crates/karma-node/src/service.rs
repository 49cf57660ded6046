//! Service composition.
//!
//! [`KarmaService`] wires one store into the ledger, the reporter and the
//! reward gate. Every component shares the same `Arc<dyn KarmaStore>`, so a
//! score moved by an append is the score the gate and the reporter read.

use std::sync::Arc;

use tracing::info;

use karma_core::error::KarmaError;
use karma_core::ledger::Ledger;
use karma_core::memory::MemoryStore;
use karma_core::reporting::Reporter;
use karma_core::rewards::RewardGate;
use karma_core::traits::KarmaStore;

use crate::config::{NodeConfig, StoreKind};
use crate::storage::RocksStore;

/// Ledger, reporting and reward gate over one shared store.
#[derive(Clone)]
pub struct KarmaService {
    store: Arc<dyn KarmaStore>,
    ledger: Ledger,
    reporter: Reporter,
    rewards: RewardGate,
}

impl KarmaService {
    /// Open the store selected by `config` and compose the service over it.
    ///
    /// A store with an empty catalog is seeded with the default rewards.
    pub fn open(config: &NodeConfig) -> Result<Self, KarmaError> {
        let store: Arc<dyn KarmaStore> = match config.store {
            StoreKind::Rocksdb => {
                let path = config.db_path();
                std::fs::create_dir_all(&path)
                    .map_err(|e| KarmaError::StoreUnavailable(e.to_string()))?;
                Arc::new(RocksStore::open(&path)?)
            }
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        info!(store = ?config.store, "karma store ready");

        let service = Self::with_store(store);
        if service.store.list_rewards()?.is_empty() {
            service.rewards.seed_default_catalog()?;
        }
        Ok(service)
    }

    /// Compose the service over an existing store.
    pub fn with_store(store: Arc<dyn KarmaStore>) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&store)),
            reporter: Reporter::new(Arc::clone(&store)),
            rewards: RewardGate::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn KarmaStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn rewards(&self) -> &RewardGate {
        &self.rewards
    }
}
