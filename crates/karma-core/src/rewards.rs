//! Reward unlock gate and catalog listing.
//!
//! Each (user, reward) pair is a two-state machine, `Locked → Unlocked`, with
//! no way back. The store performs the transition under its own per-user
//! exclusion so the threshold check and the insert cannot be split by a
//! concurrent unlock of the same pair.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KarmaError, NotFoundError, UnlockError};
use crate::traits::KarmaStore;
use crate::types::{NewReward, Reward, RewardCategory, RewardId, UserId};

/// Lock state of one (user, reward) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Locked,
    Unlocked,
}

impl UnlockState {
    /// State of `reward` given a user's unlocked set.
    pub fn of(unlocked: &BTreeSet<RewardId>, reward: RewardId) -> Self {
        if unlocked.contains(&reward) {
            Self::Unlocked
        } else {
            Self::Locked
        }
    }

    /// Attempt the `Locked → Unlocked` transition at the given score.
    ///
    /// The threshold is checked before the current state, so a user below
    /// the threshold sees `InsufficientBalance` even for a reward they hold.
    ///
    /// # Examples
    ///
    /// ```
    /// use karma_core::rewards::{meets_threshold, UnlockState};
    ///
    /// assert!(meets_threshold(50, 50));
    /// assert!(!meets_threshold(-1, 0));
    /// assert_eq!(UnlockState::Locked, UnlockState::of(&Default::default(), karma_core::types::RewardId(1)));
    /// ```
    pub fn unlock(self, score: i64, reward: &Reward) -> Result<UnlockState, UnlockError> {
        if !meets_threshold(score, reward.karma_required) {
            return Err(UnlockError::InsufficientBalance {
                have: score,
                need: reward.karma_required,
            });
        }
        match self {
            Self::Locked => Ok(Self::Unlocked),
            Self::Unlocked => Err(UnlockError::AlreadyUnlocked(reward.id)),
        }
    }
}

/// `score >= required`, without overflow for thresholds above `i64::MAX`.
pub fn meets_threshold(score: i64, required: u64) -> bool {
    i128::from(score) >= i128::from(required)
}

/// A catalog reward annotated for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub reward: Reward,
    pub is_unlocked: bool,
    /// Score meets the threshold, regardless of lock state.
    pub can_unlock: bool,
}

/// The catalog installed by [`RewardGate::seed_default_catalog`].
pub fn default_catalog() -> Vec<NewReward> {
    let entry = |title: &str, description: &str, karma_required, category| NewReward {
        title: title.to_string(),
        description: description.to_string(),
        karma_required,
        category,
        image_url: String::new(),
        active: true,
    };
    vec![
        entry(
            "5% Cashback",
            "Get 5% cashback on all purchases for a month",
            100,
            RewardCategory::Cashback,
        ),
        entry(
            "Premium Support",
            "Access to premium customer support",
            150,
            RewardCategory::Feature,
        ),
        entry(
            "Credit Score Boost Badge",
            "Show off your excellent credit behavior",
            200,
            RewardCategory::Badge,
        ),
        entry(
            "10% Shopping Discount",
            "Get 10% off on partner stores",
            250,
            RewardCategory::Discount,
        ),
        entry(
            "VIP Status",
            "Unlock VIP features and benefits",
            500,
            RewardCategory::Feature,
        ),
    ]
}

/// Unlocks rewards and lists the catalog for a user.
#[derive(Clone)]
pub struct RewardGate {
    store: Arc<dyn KarmaStore>,
}

impl RewardGate {
    pub fn new(store: Arc<dyn KarmaStore>) -> Self {
        Self { store }
    }

    /// Unlock `reward_id` for `user`.
    ///
    /// # Errors
    ///
    /// - [`NotFoundError::Reward`] if the reward id is unknown
    /// - [`UnlockError::InsufficientBalance`] if the score is below the threshold
    /// - [`UnlockError::AlreadyUnlocked`] if the pair is already unlocked
    pub fn unlock(&self, user: &UserId, reward_id: RewardId) -> Result<Reward, KarmaError> {
        let reward = self
            .store
            .get_reward(reward_id)?
            .ok_or(NotFoundError::Reward(reward_id))?;

        let updated = self.store.unlock_reward(user, &reward)?;
        info!(
            user = %user,
            reward = %reward.id,
            karma_score = updated.karma_score,
            "reward unlocked"
        );
        Ok(reward)
    }

    /// Active rewards by threshold, each flagged for the user.
    pub fn catalog(&self, user: &UserId) -> Result<Vec<CatalogEntry>, KarmaError> {
        let owner = self
            .store
            .get_user(user)?
            .ok_or_else(|| NotFoundError::User(user.clone()))?;

        let entries = self
            .store
            .list_rewards()?
            .into_iter()
            .filter(|reward| reward.active)
            .map(|reward| CatalogEntry {
                is_unlocked: UnlockState::of(&owner.unlocked_rewards, reward.id)
                    == UnlockState::Unlocked,
                can_unlock: meets_threshold(owner.karma_score, reward.karma_required),
                reward,
            })
            .collect();
        Ok(entries)
    }

    /// Replace the catalog with [`default_catalog`].
    pub fn seed_default_catalog(&self) -> Result<Vec<Reward>, KarmaError> {
        let rewards = self.store.replace_catalog(default_catalog())?;
        info!(count = rewards.len(), "reward catalog seeded");
        Ok(rewards)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::{RewardStore, ScoreCounter, UserStore};
    use crate::types::{NewUser, Role};

    fn reward(id: u64, karma_required: u64) -> Reward {
        NewReward {
            title: format!("reward {id}"),
            description: "test".into(),
            karma_required,
            category: RewardCategory::Badge,
            image_url: String::new(),
            active: true,
        }
        .into_reward(RewardId(id), Utc::now())
    }

    fn setup(score: i64) -> (Arc<MemoryStore>, RewardGate, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::from("alice");
        store
            .register_user(NewUser {
                id: user.clone(),
                username: "alice".into(),
                email: "alice@example.com".into(),
                role: Role::User,
            })
            .unwrap();
        store.apply_delta(&user, score).unwrap();
        let gate = RewardGate::new(store.clone());
        (store, gate, user)
    }

    #[test]
    fn transition_checks_threshold_first() {
        let r = reward(1, 50);
        assert_eq!(
            UnlockState::Unlocked.unlock(10, &r),
            Err(UnlockError::InsufficientBalance { have: 10, need: 50 })
        );
        assert_eq!(
            UnlockState::Unlocked.unlock(50, &r),
            Err(UnlockError::AlreadyUnlocked(RewardId(1)))
        );
        assert_eq!(UnlockState::Locked.unlock(50, &r), Ok(UnlockState::Unlocked));
    }

    #[test]
    fn threshold_handles_extremes() {
        assert!(!meets_threshold(i64::MAX, u64::MAX));
        assert!(meets_threshold(i64::MAX, i64::MAX as u64));
        assert!(!meets_threshold(-5, 0));
    }

    #[test]
    fn unknown_reward_is_not_found() {
        let (_store, gate, user) = setup(1000);
        let err = gate.unlock(&user, RewardId(99)).unwrap_err();
        assert_eq!(err, KarmaError::NotFound(NotFoundError::Reward(RewardId(99))));
    }

    #[test]
    fn unlock_then_repeat_fails() {
        let (store, gate, user) = setup(120);
        let seeded = gate.seed_default_catalog().unwrap();
        let cashback = seeded[0].id;

        let unlocked = gate.unlock(&user, cashback).unwrap();
        assert_eq!(unlocked.title, "5% Cashback");
        assert!(store.get_user(&user).unwrap().unwrap().unlocked_rewards.contains(&cashback));

        let err = gate.unlock(&user, cashback).unwrap_err();
        assert_eq!(err, KarmaError::Unlock(UnlockError::AlreadyUnlocked(cashback)));
    }

    #[test]
    fn catalog_flags_and_filters_inactive() {
        let (store, gate, user) = setup(160);
        gate.seed_default_catalog().unwrap();
        store
            .insert_reward(NewReward {
                title: "Retired".into(),
                description: "no longer offered".into(),
                karma_required: 1,
                category: RewardCategory::Discount,
                image_url: String::new(),
                active: false,
            })
            .unwrap();

        let first = store.list_rewards().unwrap()[1].id;
        assert_eq!(store.list_rewards().unwrap()[0].title, "Retired");
        gate.unlock(&user, first).unwrap();

        let catalog = gate.catalog(&user).unwrap();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.iter().all(|e| e.reward.active));
        let thresholds: Vec<u64> = catalog.iter().map(|e| e.reward.karma_required).collect();
        assert_eq!(thresholds, vec![100, 150, 200, 250, 500]);

        let flags: Vec<(bool, bool)> = catalog.iter().map(|e| (e.is_unlocked, e.can_unlock)).collect();
        assert_eq!(
            flags,
            vec![(true, true), (false, true), (false, false), (false, false), (false, false)]
        );

        // A score that falls back under the threshold keeps the unlock.
        store.apply_delta(&user, -100).unwrap();
        let catalog = gate.catalog(&user).unwrap();
        assert!(catalog[0].is_unlocked);
        assert!(!catalog[0].can_unlock);
    }

    #[test]
    fn catalog_entry_flattens_reward_fields() {
        let entry = CatalogEntry {
            reward: reward(4, 250),
            is_unlocked: false,
            can_unlock: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["karmaRequired"], 250);
        assert_eq!(json["canUnlock"], true);
        assert_eq!(json["isUnlocked"], false);
    }
}
