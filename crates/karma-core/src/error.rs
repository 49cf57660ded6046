//! Error types for the Karma ledger.
use thiserror::Error;

use crate::types::{BehaviorId, RewardId, UserId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("behavior type is required")] MissingType,
    #[error("description is required")] MissingDescription,
    #[error("malformed behavior type: {0:?}")] MalformedType(String),
    #[error("malformed date: {0:?}")] MalformedDate(String),
    #[error("malformed request body: {0}")] MalformedBody(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("behavior not found: {0}")] Behavior(BehaviorId),
    #[error("reward not found: {0}")] Reward(RewardId),
    #[error("user not found: {0}")] User(UserId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnlockError {
    #[error("insufficient karma score: have {have}, need {need}")] InsufficientBalance { have: i64, need: u64 },
    #[error("reward already unlocked: {0}")] AlreadyUnlocked(RewardId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KarmaError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error(transparent)] NotFound(#[from] NotFoundError),
    #[error(transparent)] Unlock(#[from] UnlockError),
    #[error("user already registered: {0}")] DuplicateUser(UserId),
    /// Transient store failure; surfaced as-is, never retried here.
    #[error("store unavailable: {0}")] StoreUnavailable(String),
}
