//! Shared test helpers for scenario and property tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use karma_core::ledger::BehaviorRequest;
use karma_core::memory::MemoryStore;
use karma_core::types::{NewReward, NewUser, RewardCategory, Role, User, UserId};
use karma_node::{KarmaService, RocksStore};

/// Which store a [`Harness`] runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Rocks,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Memory, Backend::Rocks];
}

/// A service over a fresh, empty store. Holds the RocksDB directory alive.
pub struct Harness {
    pub service: KarmaService,
    _dir: Option<TempDir>,
}

impl Harness {
    pub fn new(backend: Backend) -> Self {
        match backend {
            Backend::Memory => Self {
                service: KarmaService::with_store(Arc::new(MemoryStore::new())),
                _dir: None,
            },
            Backend::Rocks => {
                let dir = tempfile::tempdir().unwrap();
                let store = RocksStore::open(dir.path().join("ledger")).unwrap();
                Self {
                    service: KarmaService::with_store(Arc::new(store)),
                    _dir: Some(dir),
                }
            }
        }
    }

    /// Register a plain user named after its id.
    pub fn user(&self, id: &str) -> UserId {
        self.register(id, Role::User).id
    }

    pub fn register(&self, id: &str, role: Role) -> User {
        self.service
            .store()
            .register_user(NewUser {
                id: UserId::from(id),
                username: format!("{id}-name"),
                email: format!("{id}@example.com"),
                role,
            })
            .unwrap()
    }

    pub fn score(&self, user: &UserId) -> i64 {
        self.service.store().score(user).unwrap().unwrap()
    }
}

/// Fixed reference instant for dated events.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// An ingestion request for `kind`, timestamped at ingestion.
pub fn request(kind: &str) -> BehaviorRequest {
    BehaviorRequest {
        kind: Some(kind.to_string()),
        description: Some(format!("{kind} event")),
        metadata: None,
        date: None,
    }
}

/// An ingestion request for `kind` carrying an explicit date.
pub fn dated_request(kind: &str, date: DateTime<Utc>) -> BehaviorRequest {
    BehaviorRequest {
        date: Some(date.to_rfc3339()),
        ..request(kind)
    }
}

pub fn reward(title: &str, karma_required: u64) -> NewReward {
    NewReward {
        title: title.to_string(),
        description: format!("{title} reward"),
        karma_required,
        category: RewardCategory::Cashback,
        image_url: String::new(),
        active: true,
    }
}
