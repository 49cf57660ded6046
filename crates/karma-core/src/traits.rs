//! Trait interfaces between the ledger services and the persistence layer.
//!
//! - [`UserStore`]: user registry and the reward-unlock transition
//! - [`ScoreCounter`]: atomic increment of a user's karma score
//! - [`LedgerStore`]: append-only behavior events
//! - [`RewardStore`]: the reward catalog
//!
//! [`KarmaStore`] bundles all four. The in-memory implementation lives in
//! [`crate::memory`]; the RocksDB one in karma-node.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::KarmaError;
use crate::types::{
    Behavior, BehaviorDraft, BehaviorId, BehaviorType, NewReward, NewUser, Reward, RewardId,
    TypeTotals, User, UserId,
};

/// User registry.
pub trait UserStore: Send + Sync {
    /// Register a user with a zero score and no unlocked rewards.
    ///
    /// # Errors
    ///
    /// - [`KarmaError::DuplicateUser`] if the id is already registered
    fn register_user(&self, user: NewUser) -> Result<User, KarmaError>;

    /// Look up a user, with the live karma score. Returns `None` if unknown.
    fn get_user(&self, id: &UserId) -> Result<Option<User>, KarmaError>;

    /// All users in registration order.
    fn list_users(&self) -> Result<Vec<User>, KarmaError>;

    /// Move `reward` into the user's unlocked set.
    ///
    /// The threshold check, the membership check and the insert happen as one
    /// step with respect to other unlocks for the same user, so two racing
    /// calls cannot both succeed. Implementations should evaluate the
    /// transition with [`crate::rewards::UnlockState::unlock`].
    ///
    /// # Errors
    ///
    /// - [`NotFoundError::User`](crate::error::NotFoundError::User) if the user is unknown
    /// - [`UnlockError::InsufficientBalance`](crate::error::UnlockError::InsufficientBalance)
    ///   if the score is below `reward.karma_required`
    /// - [`UnlockError::AlreadyUnlocked`](crate::error::UnlockError::AlreadyUnlocked)
    ///   if the reward is already in the set
    fn unlock_reward(&self, id: &UserId, reward: &Reward) -> Result<User, KarmaError>;
}

/// Atomic per-user karma counter.
///
/// `apply_delta` is an atomic arithmetic increment executed by the store,
/// never a read-modify-write of a cached value. It is not idempotent: every
/// call moves the score.
pub trait ScoreCounter: Send + Sync {
    /// Add `delta` to the user's karma score.
    ///
    /// # Errors
    ///
    /// - [`NotFoundError::User`](crate::error::NotFoundError::User) if the user is unknown
    fn apply_delta(&self, id: &UserId, delta: i64) -> Result<(), KarmaError>;

    /// Current karma score, or `None` if the user is unknown.
    fn score(&self, id: &UserId) -> Result<Option<i64>, KarmaError>;
}

/// Append-only behavior ledger.
pub trait LedgerStore: Send + Sync {
    /// Persist a new event and apply its points to the owner's score.
    ///
    /// The increment is applied exactly once, after (or atomically with) the
    /// event write. Stores that cannot write both atomically must write the
    /// event first: a crash in between leaves the score under-counted, which
    /// the reconciliation pass detects.
    ///
    /// # Errors
    ///
    /// - [`NotFoundError::User`](crate::error::NotFoundError::User) if the owner is unknown
    fn append(&self, draft: BehaviorDraft) -> Result<Behavior, KarmaError>;

    /// Fetch an event only if it is owned by `user`.
    fn get_behavior(&self, user: &UserId, id: BehaviorId) -> Result<Option<Behavior>, KarmaError>;

    /// The user's events, newest `date` first, at most `limit` of them.
    fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Behavior>, KarmaError>;

    /// Number of the user's events with `is_read == false`.
    fn count_unread(&self, user: &UserId) -> Result<u64, KarmaError>;

    /// Set `is_read` on one event owned by `user`. Returns `None` if no such
    /// event is owned by that user.
    fn mark_read(&self, user: &UserId, id: BehaviorId) -> Result<Option<Behavior>, KarmaError>;

    /// Set `is_read` on every unread event of the user. Returns how many changed.
    fn mark_all_read(&self, user: &UserId) -> Result<u64, KarmaError>;

    /// Count and point total per kind, for one user or for the whole ledger.
    fn group_by_type(
        &self,
        user: Option<&UserId>,
    ) -> Result<BTreeMap<BehaviorType, TypeTotals>, KarmaError>;

    /// Events with `date >= since`, in append order.
    fn behaviors_since(&self, since: DateTime<Utc>) -> Result<Vec<Behavior>, KarmaError>;

    /// Total number of events in the ledger.
    fn count_behaviors(&self) -> Result<u64, KarmaError>;

    /// Sum of `karma_points` over every event owned by the user.
    fn ledger_total(&self, user: &UserId) -> Result<i64, KarmaError>;
}

/// Reward catalog.
pub trait RewardStore: Send + Sync {
    fn insert_reward(&self, reward: NewReward) -> Result<Reward, KarmaError>;

    fn get_reward(&self, id: RewardId) -> Result<Option<Reward>, KarmaError>;

    /// Every reward, active or not, by `karma_required` ascending then id.
    fn list_rewards(&self) -> Result<Vec<Reward>, KarmaError>;

    /// Drop the whole catalog and insert `rewards` in its place.
    fn replace_catalog(&self, rewards: Vec<NewReward>) -> Result<Vec<Reward>, KarmaError>;
}

/// Everything the ledger services need from a store.
pub trait KarmaStore: UserStore + ScoreCounter + LedgerStore + RewardStore {}

impl<T> KarmaStore for T where T: UserStore + ScoreCounter + LedgerStore + RewardStore {}
