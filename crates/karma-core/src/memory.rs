//! In-memory [`KarmaStore`](crate::traits::KarmaStore) for tests and
//! single-process use.
//!
//! Scores are `AtomicI64` counters incremented with `fetch_add`, so concurrent
//! appends for one user never lose an update. Events are written before the
//! increment is applied. Nothing is persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};

use crate::error::{KarmaError, NotFoundError};
use crate::rewards::UnlockState;
use crate::traits::{LedgerStore, RewardStore, ScoreCounter, UserStore};
use crate::types::{
    Behavior, BehaviorDraft, BehaviorId, BehaviorType, NewReward, NewUser, Reward, RewardId, Role,
    TypeTotals, User, UserId,
};

/// Registry entry for one user.
struct UserEntry {
    id: UserId,
    username: String,
    email: String,
    role: Role,
    created_at: DateTime<Utc>,
    ordinal: u64,
    karma_score: AtomicI64,
    /// Guarded set; the lock also serializes unlock transitions for this user.
    unlocked: Mutex<BTreeSet<RewardId>>,
}

impl UserEntry {
    fn snapshot(&self) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            karma_score: self.karma_score.load(Ordering::SeqCst),
            unlocked_rewards: self.unlocked.lock().clone(),
            created_at: self.created_at,
            ordinal: self.ordinal,
        }
    }
}

/// In-memory store backed by a `DashMap` of users and lock-guarded maps.
pub struct MemoryStore {
    users: DashMap<UserId, Arc<UserEntry>>,
    /// Events keyed by id, which is also append order.
    behaviors: RwLock<BTreeMap<BehaviorId, Behavior>>,
    rewards: RwLock<BTreeMap<RewardId, Reward>>,
    next_behavior_id: AtomicU64,
    next_reward_id: AtomicU64,
    next_ordinal: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            behaviors: RwLock::new(BTreeMap::new()),
            rewards: RwLock::new(BTreeMap::new()),
            next_behavior_id: AtomicU64::new(1),
            next_reward_id: AtomicU64::new(1),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Clone the entry out so no shard guard is held across other calls.
    fn entry(&self, id: &UserId) -> Result<Arc<UserEntry>, KarmaError> {
        self.users
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| NotFoundError::User(id.clone()).into())
    }
}

impl UserStore for MemoryStore {
    fn register_user(&self, user: NewUser) -> Result<User, KarmaError> {
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(KarmaError::DuplicateUser(user.id)),
            Entry::Vacant(slot) => {
                let entry = Arc::new(UserEntry {
                    id: user.id,
                    username: user.username,
                    email: user.email,
                    role: user.role,
                    created_at: Utc::now(),
                    ordinal: self.next_ordinal.fetch_add(1, Ordering::SeqCst),
                    karma_score: AtomicI64::new(0),
                    unlocked: Mutex::new(BTreeSet::new()),
                });
                let snapshot = entry.snapshot();
                slot.insert(entry);
                Ok(snapshot)
            }
        }
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>, KarmaError> {
        Ok(self.users.get(id).map(|e| e.value().snapshot()))
    }

    fn list_users(&self) -> Result<Vec<User>, KarmaError> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().snapshot()).collect();
        users.sort_by_key(|u| u.ordinal);
        Ok(users)
    }

    fn unlock_reward(&self, id: &UserId, reward: &Reward) -> Result<User, KarmaError> {
        let entry = self.entry(id)?;
        {
            let mut unlocked = entry.unlocked.lock();
            let score = entry.karma_score.load(Ordering::SeqCst);
            UnlockState::of(&unlocked, reward.id).unlock(score, reward)?;
            unlocked.insert(reward.id);
        }
        Ok(entry.snapshot())
    }
}

impl ScoreCounter for MemoryStore {
    fn apply_delta(&self, id: &UserId, delta: i64) -> Result<(), KarmaError> {
        self.entry(id)?.karma_score.fetch_add(delta, Ordering::SeqCst);
        Ok(())
    }

    fn score(&self, id: &UserId) -> Result<Option<i64>, KarmaError> {
        Ok(self
            .users
            .get(id)
            .map(|e| e.value().karma_score.load(Ordering::SeqCst)))
    }
}

impl LedgerStore for MemoryStore {
    fn append(&self, draft: BehaviorDraft) -> Result<Behavior, KarmaError> {
        let entry = self.entry(&draft.user)?;
        let id = BehaviorId(self.next_behavior_id.fetch_add(1, Ordering::SeqCst));
        let behavior = draft.into_behavior(id);

        self.behaviors.write().insert(id, behavior.clone());
        entry.karma_score.fetch_add(behavior.karma_points, Ordering::SeqCst);

        tracing::debug!(
            user = %behavior.user,
            id = %id,
            kind = %behavior.kind,
            points = behavior.karma_points,
            "behavior appended"
        );
        Ok(behavior)
    }

    fn get_behavior(&self, user: &UserId, id: BehaviorId) -> Result<Option<Behavior>, KarmaError> {
        Ok(self
            .behaviors
            .read()
            .get(&id)
            .filter(|b| &b.user == user)
            .cloned())
    }

    fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Behavior>, KarmaError> {
        let mut owned: Vec<Behavior> = self
            .behaviors
            .read()
            .values()
            .filter(|b| &b.user == user)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        owned.truncate(limit);
        Ok(owned)
    }

    fn count_unread(&self, user: &UserId) -> Result<u64, KarmaError> {
        Ok(self
            .behaviors
            .read()
            .values()
            .filter(|b| &b.user == user && !b.is_read)
            .count() as u64)
    }

    fn mark_read(&self, user: &UserId, id: BehaviorId) -> Result<Option<Behavior>, KarmaError> {
        let mut behaviors = self.behaviors.write();
        Ok(behaviors
            .get_mut(&id)
            .filter(|b| &b.user == user)
            .map(|b| {
                b.is_read = true;
                b.clone()
            }))
    }

    fn mark_all_read(&self, user: &UserId) -> Result<u64, KarmaError> {
        let mut changed = 0;
        for behavior in self.behaviors.write().values_mut() {
            if &behavior.user == user && !behavior.is_read {
                behavior.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn group_by_type(
        &self,
        user: Option<&UserId>,
    ) -> Result<BTreeMap<BehaviorType, TypeTotals>, KarmaError> {
        let mut groups: BTreeMap<BehaviorType, TypeTotals> = BTreeMap::new();
        for behavior in self
            .behaviors
            .read()
            .values()
            .filter(|b| user.is_none_or(|u| &b.user == u))
        {
            let totals = groups.entry(behavior.kind.clone()).or_default();
            totals.count += 1;
            totals.total_karma += behavior.karma_points;
        }
        Ok(groups)
    }

    fn behaviors_since(&self, since: DateTime<Utc>) -> Result<Vec<Behavior>, KarmaError> {
        Ok(self
            .behaviors
            .read()
            .values()
            .filter(|b| b.date >= since)
            .cloned()
            .collect())
    }

    fn count_behaviors(&self) -> Result<u64, KarmaError> {
        Ok(self.behaviors.read().len() as u64)
    }

    fn ledger_total(&self, user: &UserId) -> Result<i64, KarmaError> {
        Ok(self
            .behaviors
            .read()
            .values()
            .filter(|b| &b.user == user)
            .map(|b| b.karma_points)
            .sum())
    }
}

impl RewardStore for MemoryStore {
    fn insert_reward(&self, reward: NewReward) -> Result<Reward, KarmaError> {
        let id = RewardId(self.next_reward_id.fetch_add(1, Ordering::SeqCst));
        let reward = reward.into_reward(id, Utc::now());
        self.rewards.write().insert(id, reward.clone());
        Ok(reward)
    }

    fn get_reward(&self, id: RewardId) -> Result<Option<Reward>, KarmaError> {
        Ok(self.rewards.read().get(&id).cloned())
    }

    fn list_rewards(&self) -> Result<Vec<Reward>, KarmaError> {
        let mut rewards: Vec<Reward> = self.rewards.read().values().cloned().collect();
        rewards.sort_by_key(|r| (r.karma_required, r.id));
        Ok(rewards)
    }

    fn replace_catalog(&self, rewards: Vec<NewReward>) -> Result<Vec<Reward>, KarmaError> {
        let mut catalog = self.rewards.write();
        catalog.clear();
        let now = Utc::now();
        Ok(rewards
            .into_iter()
            .map(|reward| {
                let id = RewardId(self.next_reward_id.fetch_add(1, Ordering::SeqCst));
                let reward = reward.into_reward(id, now);
                catalog.insert(id, reward.clone());
                reward
            })
            .collect())
    }
}
