//! RocksDB-backed persistent ledger storage.
//!
//! Implements every store trait from karma-core using column families for
//! users, scores, behaviors, the per-user timeline index, the unread index,
//! and rewards. Records are JSON; index keys are big-endian so iteration
//! order matches id and date order.
//!
//! Scores live in their own column family behind an associative merge
//! operator: an increment is a `merge` of the delta, summed by RocksDB
//! itself, never a read-modify-write here. An append writes the event, its
//! index entries and the score merge in one [`WriteBatch`], so a crash can
//! never leave an event without its increment.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, MergeOperands, Options,
    WriteBatch,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use karma_core::error::{KarmaError, NotFoundError};
use karma_core::rewards::UnlockState;
use karma_core::traits::{LedgerStore, RewardStore, ScoreCounter, UserStore};
use karma_core::types::{
    Behavior, BehaviorDraft, BehaviorId, BehaviorType, NewReward, NewUser, Reward, RewardId, Role,
    TypeTotals, User, UserId,
};

// --- Column family names ---

const CF_USERS: &str = "users";
const CF_SCORES: &str = "scores";
const CF_BEHAVIORS: &str = "behaviors";
const CF_TIMELINE: &str = "timeline";
const CF_UNREAD: &str = "unread";
const CF_REWARDS: &str = "rewards";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_USERS,
    CF_SCORES,
    CF_BEHAVIORS,
    CF_TIMELINE,
    CF_UNREAD,
    CF_REWARDS,
];

/// Name registered for the score merge operator.
const SCORE_MERGE_OPERATOR: &str = "karma_score_add";

/// User document. The score is kept out of it, in `CF_SCORES`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: UserId,
    username: String,
    email: String,
    role: Role,
    unlocked_rewards: std::collections::BTreeSet<RewardId>,
    created_at: DateTime<Utc>,
    ordinal: u64,
}

impl StoredUser {
    fn with_score(self, karma_score: i64) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            role: self.role,
            karma_score,
            unlocked_rewards: self.unlocked_rewards,
            created_at: self.created_at,
            ordinal: self.ordinal,
        }
    }
}

/// Associative merge: the stored score is the sum of every merged delta.
fn add_scores(_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    let mut total = existing.map(decode_score).unwrap_or(0);
    for operand in operands.iter() {
        total = total.saturating_add(decode_score(operand));
    }
    Some(total.to_le_bytes().to_vec())
}

fn decode_score(bytes: &[u8]) -> i64 {
    <[u8; 8]>::try_from(bytes).map(i64::from_le_bytes).unwrap_or(0)
}

fn store_err(e: impl std::fmt::Display) -> KarmaError {
    KarmaError::StoreUnavailable(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, KarmaError> {
    serde_json::to_vec(value).map_err(store_err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, KarmaError> {
    serde_json::from_slice(bytes).map_err(store_err)
}

/// RocksDB-backed persistent ledger storage.
///
/// Appends are atomic via [`WriteBatch`]. Unlock transitions and read-flag
/// updates take a per-user lock so their check and write cannot interleave
/// with another writer for the same user.
pub struct RocksStore {
    db: DB,
    next_behavior_id: AtomicU64,
    next_reward_id: AtomicU64,
    next_ordinal: AtomicU64,
    /// Serializes registrations so the existence check and insert agree.
    registration: Mutex<()>,
    /// Serializes catalog replacement against inserts.
    catalog: Mutex<()>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl RocksStore {
    /// Open or create a database at the given path.
    ///
    /// Creates all column families if they don't exist and resumes the id
    /// counters from the highest stored keys.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KarmaError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| {
                let mut opts = Options::default();
                if *name == CF_SCORES {
                    opts.set_merge_operator_associative(SCORE_MERGE_OPERATOR, add_scores);
                }
                ColumnFamilyDescriptor::new(*name, opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(store_err)?;

        let store = Self {
            db,
            next_behavior_id: AtomicU64::new(1),
            next_reward_id: AtomicU64::new(1),
            next_ordinal: AtomicU64::new(0),
            registration: Mutex::new(()),
            catalog: Mutex::new(()),
            user_locks: DashMap::new(),
        };

        let last_behavior = store.last_id(CF_BEHAVIORS)?;
        let last_reward = store.last_id(CF_REWARDS)?;
        let next_ordinal = store
            .stored_users()?
            .iter()
            .map(|u| u.ordinal + 1)
            .max()
            .unwrap_or(0);
        store.next_behavior_id.store(last_behavior + 1, Ordering::SeqCst);
        store.next_reward_id.store(last_reward + 1, Ordering::SeqCst);
        store.next_ordinal.store(next_ordinal, Ordering::SeqCst);

        tracing::info!(
            path = %path.as_ref().display(),
            behaviors = last_behavior,
            users = next_ordinal,
            "ledger opened"
        );
        Ok(store)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), KarmaError> {
        self.db.flush().map_err(store_err)
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily, KarmaError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| store_err(format!("missing column family: {name}")))
    }

    /// Length-prefixed user id, so no user's prefix is another's.
    fn user_prefix(user: &UserId) -> Vec<u8> {
        let bytes = user.as_str().as_bytes();
        let mut key = Vec::with_capacity(4 + bytes.len() + 16);
        key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        key.extend_from_slice(bytes);
        key
    }

    /// Timeline key: user prefix || date (order-preserving) || id.
    fn timeline_key(user: &UserId, date: DateTime<Utc>, id: BehaviorId) -> Vec<u8> {
        let mut key = Self::user_prefix(user);
        let micros = (date.timestamp_micros() as u64) ^ (1 << 63);
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(&id.0.to_be_bytes());
        key
    }

    /// Unread index key: user prefix || id.
    fn unread_key(user: &UserId, id: BehaviorId) -> Vec<u8> {
        let mut key = Self::user_prefix(user);
        key.extend_from_slice(&id.0.to_be_bytes());
        key
    }

    /// Trailing big-endian id of an index key.
    fn id_suffix(key: &[u8]) -> Result<BehaviorId, KarmaError> {
        key.len()
            .checked_sub(8)
            .and_then(|start| <[u8; 8]>::try_from(&key[start..]).ok())
            .map(|raw| BehaviorId(u64::from_be_bytes(raw)))
            .ok_or_else(|| store_err("invalid index key length"))
    }

    /// Highest big-endian `u64` key in a column family, or 0 if empty.
    fn last_id(&self, cf_name: &str) -> Result<u64, KarmaError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item.map_err(store_err)?;
                <[u8; 8]>::try_from(&key[..])
                    .map(u64::from_be_bytes)
                    .map_err(|_| store_err("invalid id key length"))
            }
            None => Ok(0),
        }
    }

    /// Keys starting with `prefix`, in ascending order.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>, KarmaError> {
        let cf = self.cf_handle(cf_name)?;
        let mut keys = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(store_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Decode every value of a column family, in key order.
    fn scan_values<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>, KarmaError> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(store_err)?;
                decode(&value)
            })
            .collect()
    }

    fn stored_users(&self) -> Result<Vec<StoredUser>, KarmaError> {
        self.scan_values(CF_USERS)
    }

    fn read_user(&self, id: &UserId) -> Result<Option<StoredUser>, KarmaError> {
        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .get_cf(cf, id.as_str().as_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn read_score(&self, id: &UserId) -> Result<i64, KarmaError> {
        let cf = self.cf_handle(CF_SCORES)?;
        Ok(self
            .db
            .get_cf(cf, id.as_str().as_bytes())
            .map_err(store_err)?
            .map(|bytes| decode_score(&bytes))
            .unwrap_or(0))
    }

    fn read_behavior(&self, id: BehaviorId) -> Result<Option<Behavior>, KarmaError> {
        let cf = self.cf_handle(CF_BEHAVIORS)?;
        self.db
            .get_cf(cf, id.0.to_be_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The user's events in timeline (date ascending) order.
    fn user_behaviors(&self, user: &UserId) -> Result<Vec<Behavior>, KarmaError> {
        let mut behaviors = Vec::new();
        for key in self.prefix_keys(CF_TIMELINE, &Self::user_prefix(user))? {
            if let Some(behavior) = self.read_behavior(Self::id_suffix(&key)?)? {
                behaviors.push(behavior);
            }
        }
        Ok(behaviors)
    }

    /// The per-user lock. Only registered users get one; `None` otherwise.
    fn user_lock(&self, id: &UserId) -> Result<Option<Arc<Mutex<()>>>, KarmaError> {
        if let Some(lock) = self.user_locks.get(id) {
            return Ok(Some(Arc::clone(lock.value())));
        }
        if self.read_user(id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(Arc::clone(
            self.user_locks.entry(id.clone()).or_default().value(),
        )))
    }

    fn require_user(&self, id: &UserId) -> Result<StoredUser, KarmaError> {
        self.read_user(id)?
            .ok_or_else(|| NotFoundError::User(id.clone()).into())
    }
}

impl UserStore for RocksStore {
    fn register_user(&self, user: NewUser) -> Result<User, KarmaError> {
        let _guard = self.registration.lock();
        if self.read_user(&user.id)?.is_some() {
            return Err(KarmaError::DuplicateUser(user.id));
        }

        let stored = StoredUser {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            unlocked_rewards: Default::default(),
            created_at: Utc::now(),
            ordinal: self.next_ordinal.fetch_add(1, Ordering::SeqCst),
        };
        let key = stored.id.as_str().as_bytes().to_vec();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_USERS)?, &key, encode(&stored)?);
        batch.put_cf(self.cf_handle(CF_SCORES)?, &key, 0i64.to_le_bytes());
        self.db.write(batch).map_err(store_err)?;

        tracing::info!(user = %stored.id, ordinal = stored.ordinal, "user registered");
        Ok(stored.with_score(0))
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>, KarmaError> {
        match self.read_user(id)? {
            Some(stored) => Ok(Some(stored.with_score(self.read_score(id)?))),
            None => Ok(None),
        }
    }

    fn list_users(&self) -> Result<Vec<User>, KarmaError> {
        let mut users = self
            .stored_users()?
            .into_iter()
            .map(|stored| {
                let score = self.read_score(&stored.id)?;
                Ok(stored.with_score(score))
            })
            .collect::<Result<Vec<User>, KarmaError>>()?;
        users.sort_by_key(|u| u.ordinal);
        Ok(users)
    }

    fn unlock_reward(&self, id: &UserId, reward: &Reward) -> Result<User, KarmaError> {
        let Some(lock) = self.user_lock(id)? else {
            return Err(NotFoundError::User(id.clone()).into());
        };
        let _guard = lock.lock();

        let mut stored = self.require_user(id)?;
        let score = self.read_score(id)?;
        UnlockState::of(&stored.unlocked_rewards, reward.id).unlock(score, reward)?;
        stored.unlocked_rewards.insert(reward.id);

        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .put_cf(cf, id.as_str().as_bytes(), encode(&stored)?)
            .map_err(store_err)?;
        Ok(stored.with_score(score))
    }
}

impl ScoreCounter for RocksStore {
    fn apply_delta(&self, id: &UserId, delta: i64) -> Result<(), KarmaError> {
        self.require_user(id)?;
        let cf = self.cf_handle(CF_SCORES)?;
        self.db
            .merge_cf(cf, id.as_str().as_bytes(), delta.to_le_bytes())
            .map_err(store_err)
    }

    fn score(&self, id: &UserId) -> Result<Option<i64>, KarmaError> {
        match self.read_user(id)? {
            Some(_) => Ok(Some(self.read_score(id)?)),
            None => Ok(None),
        }
    }
}

impl LedgerStore for RocksStore {
    fn append(&self, draft: BehaviorDraft) -> Result<Behavior, KarmaError> {
        self.require_user(&draft.user)?;
        let id = BehaviorId(self.next_behavior_id.fetch_add(1, Ordering::SeqCst));
        let behavior = draft.into_behavior(id);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_BEHAVIORS)?, id.0.to_be_bytes(), encode(&behavior)?);
        batch.put_cf(
            self.cf_handle(CF_TIMELINE)?,
            Self::timeline_key(&behavior.user, behavior.date, id),
            b"",
        );
        batch.put_cf(
            self.cf_handle(CF_UNREAD)?,
            Self::unread_key(&behavior.user, id),
            b"",
        );
        batch.merge_cf(
            self.cf_handle(CF_SCORES)?,
            behavior.user.as_str().as_bytes(),
            behavior.karma_points.to_le_bytes(),
        );
        self.db.write(batch).map_err(store_err)?;

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
        Ok(self.read_behavior(id)?.filter(|b| &b.user == user))
    }

    fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Behavior>, KarmaError> {
        let mut behaviors = Vec::new();
        if limit == 0 {
            return Ok(behaviors);
        }

        let prefix = Self::user_prefix(user);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xFF; 16]);

        let cf = self.cf_handle(CF_TIMELINE)?;
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse))
        {
            let (key, _) = item.map_err(store_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(behavior) = self.read_behavior(Self::id_suffix(&key)?)? {
                behaviors.push(behavior);
                if behaviors.len() == limit {
                    break;
                }
            }
        }
        Ok(behaviors)
    }

    fn count_unread(&self, user: &UserId) -> Result<u64, KarmaError> {
        Ok(self.prefix_keys(CF_UNREAD, &Self::user_prefix(user))?.len() as u64)
    }

    fn mark_read(&self, user: &UserId, id: BehaviorId) -> Result<Option<Behavior>, KarmaError> {
        let Some(lock) = self.user_lock(user)? else {
            return Ok(None);
        };
        let _guard = lock.lock();

        let Some(mut behavior) = self.get_behavior(user, id)? else {
            return Ok(None);
        };
        if !behavior.is_read {
            behavior.is_read = true;
            let mut batch = WriteBatch::default();
            batch.put_cf(self.cf_handle(CF_BEHAVIORS)?, id.0.to_be_bytes(), encode(&behavior)?);
            batch.delete_cf(self.cf_handle(CF_UNREAD)?, Self::unread_key(user, id));
            self.db.write(batch).map_err(store_err)?;
        }
        Ok(Some(behavior))
    }

    fn mark_all_read(&self, user: &UserId) -> Result<u64, KarmaError> {
        let Some(lock) = self.user_lock(user)? else {
            return Ok(0);
        };
        let _guard = lock.lock();

        let cf_behaviors = self.cf_handle(CF_BEHAVIORS)?;
        let cf_unread = self.cf_handle(CF_UNREAD)?;
        let mut batch = WriteBatch::default();
        let mut changed = 0u64;

        for key in self.prefix_keys(CF_UNREAD, &Self::user_prefix(user))? {
            let id = Self::id_suffix(&key)?;
            if let Some(mut behavior) = self.read_behavior(id)? {
                behavior.is_read = true;
                batch.put_cf(cf_behaviors, id.0.to_be_bytes(), encode(&behavior)?);
                changed += 1;
            }
            batch.delete_cf(cf_unread, &key);
        }

        if changed > 0 {
            self.db.write(batch).map_err(store_err)?;
        }
        Ok(changed)
    }

    fn group_by_type(
        &self,
        user: Option<&UserId>,
    ) -> Result<BTreeMap<BehaviorType, TypeTotals>, KarmaError> {
        let behaviors = match user {
            Some(user) => self.user_behaviors(user)?,
            None => self.scan_values(CF_BEHAVIORS)?,
        };
        let mut groups: BTreeMap<BehaviorType, TypeTotals> = BTreeMap::new();
        for behavior in behaviors {
            let totals = groups.entry(behavior.kind).or_default();
            totals.count += 1;
            totals.total_karma += behavior.karma_points;
        }
        Ok(groups)
    }

    fn behaviors_since(&self, since: DateTime<Utc>) -> Result<Vec<Behavior>, KarmaError> {
        let mut behaviors: Vec<Behavior> = self.scan_values(CF_BEHAVIORS)?;
        behaviors.retain(|b| b.date >= since);
        Ok(behaviors)
    }

    fn count_behaviors(&self) -> Result<u64, KarmaError> {
        let cf = self.cf_handle(CF_BEHAVIORS)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(store_err)?;
            count += 1;
        }
        Ok(count)
    }

    fn ledger_total(&self, user: &UserId) -> Result<i64, KarmaError> {
        Ok(self
            .user_behaviors(user)?
            .iter()
            .map(|b| b.karma_points)
            .sum())
    }
}

impl RewardStore for RocksStore {
    fn insert_reward(&self, reward: NewReward) -> Result<Reward, KarmaError> {
        let _guard = self.catalog.lock();
        let id = RewardId(self.next_reward_id.fetch_add(1, Ordering::SeqCst));
        let reward = reward.into_reward(id, Utc::now());
        let cf = self.cf_handle(CF_REWARDS)?;
        self.db
            .put_cf(cf, id.0.to_be_bytes(), encode(&reward)?)
            .map_err(store_err)?;
        Ok(reward)
    }

    fn get_reward(&self, id: RewardId) -> Result<Option<Reward>, KarmaError> {
        let cf = self.cf_handle(CF_REWARDS)?;
        self.db
            .get_cf(cf, id.0.to_be_bytes())
            .map_err(store_err)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_rewards(&self) -> Result<Vec<Reward>, KarmaError> {
        let mut rewards: Vec<Reward> = self.scan_values(CF_REWARDS)?;
        rewards.sort_by_key(|r| (r.karma_required, r.id));
        Ok(rewards)
    }

    fn replace_catalog(&self, rewards: Vec<NewReward>) -> Result<Vec<Reward>, KarmaError> {
        let _guard = self.catalog.lock();
        let cf = self.cf_handle(CF_REWARDS)?;
        let mut batch = WriteBatch::default();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item.map_err(store_err)?;
            batch.delete_cf(cf, &key);
        }

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(rewards.len());
        for reward in rewards {
            let id = RewardId(self.next_reward_id.fetch_add(1, Ordering::SeqCst));
            let reward = reward.into_reward(id, now);
            batch.put_cf(cf, id.0.to_be_bytes(), encode(&reward)?);
            inserted.push(reward);
        }

        self.db.write(batch).map_err(store_err)?;
        Ok(inserted)
    }
}
