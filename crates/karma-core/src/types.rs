//! Domain types: users, behavior events and catalog rewards.
//!
//! JSON field names follow the presentation layer's camelCase convention
//! (`karmaPoints`, `isRead`, `karmaScore`).

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque provenance bag attached to a behavior (amount, provider, ...).
///
/// Stored verbatim; nothing in this crate reads its contents.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity key of a user, as resolved by the upstream identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Store-assigned identifier of a behavior event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorId(pub u64);

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a catalog reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub u64);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BehaviorType
// ---------------------------------------------------------------------------

/// Kind of credit behavior an event records.
///
/// The six named kinds carry points under the point policy. Any other
/// well-formed tag is kept as [`BehaviorType::Other`] and scores zero.
///
/// # Examples
///
/// ```
/// use karma_core::types::BehaviorType;
///
/// assert_eq!(BehaviorType::from("payment_late"), BehaviorType::PaymentLate);
/// assert_eq!(BehaviorType::PaymentLate.as_str(), "payment_late");
/// assert!(!BehaviorType::from("lottery_win").is_known());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BehaviorType {
    PaymentOnTime,
    PaymentLate,
    CreditUtilizationLow,
    CreditUtilizationHigh,
    NewCreditAccount,
    CreditCheck,
    /// A tag outside the closed set, preserved as given.
    Other(String),
}

impl BehaviorType {
    /// The closed set of kinds that carry points.
    pub const KNOWN: [BehaviorType; 6] = [
        BehaviorType::PaymentOnTime,
        BehaviorType::PaymentLate,
        BehaviorType::CreditUtilizationLow,
        BehaviorType::CreditUtilizationHigh,
        BehaviorType::NewCreditAccount,
        BehaviorType::CreditCheck,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::PaymentOnTime => "payment_on_time",
            Self::PaymentLate => "payment_late",
            Self::CreditUtilizationLow => "credit_utilization_low",
            Self::CreditUtilizationHigh => "credit_utilization_high",
            Self::NewCreditAccount => "new_credit_account",
            Self::CreditCheck => "credit_check",
            Self::Other(tag) => tag,
        }
    }

    /// Whether this kind belongs to the closed, point-carrying set.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for BehaviorType {
    fn from(tag: &str) -> Self {
        match tag {
            "payment_on_time" => Self::PaymentOnTime,
            "payment_late" => Self::PaymentLate,
            "credit_utilization_low" => Self::CreditUtilizationLow,
            "credit_utilization_high" => Self::CreditUtilizationHigh,
            "new_credit_account" => Self::NewCreditAccount,
            "credit_check" => Self::CreditCheck,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for BehaviorType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<BehaviorType> for String {
    fn from(kind: BehaviorType) -> Self {
        match kind {
            BehaviorType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// A recorded behavior event.
///
/// Immutable once stored except for `is_read`, which only ever flips from
/// `false` to `true`. `karma_points` is frozen at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    pub id: BehaviorId,
    /// Owning user.
    pub user: UserId,
    #[serde(rename = "type")]
    pub kind: BehaviorType,
    pub description: String,
    pub karma_points: i64,
    /// Event timestamp; defaults to ingestion time.
    pub date: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A validated behavior awaiting an id from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorDraft {
    pub user: UserId,
    pub kind: BehaviorType,
    pub description: String,
    pub karma_points: i64,
    pub date: DateTime<Utc>,
    pub metadata: Metadata,
}

impl BehaviorDraft {
    /// Materialize the stored record under the given id. New events are unread.
    pub fn into_behavior(self, id: BehaviorId) -> Behavior {
        Behavior {
            id,
            user: self.user,
            kind: self.kind,
            description: self.description,
            karma_points: self.karma_points,
            date: self.date,
            is_read: false,
            metadata: self.metadata,
        }
    }
}

/// Per-type count and point total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTotals {
    pub count: u64,
    pub total_karma: i64,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// A user as seen by the ledger.
///
/// `karma_score` is the materialized aggregate of the user's behavior points;
/// only the score counter mutates it. `unlocked_rewards` only grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub karma_score: i64,
    #[serde(default)]
    pub unlocked_rewards: BTreeSet<RewardId>,
    pub created_at: DateTime<Utc>,
    /// Registration order, assigned by the store.
    pub ordinal: u64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Registration request issued by the external registration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Reward
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    Cashback,
    Discount,
    Feature,
    Badge,
}

/// A catalog entry gated behind a karma threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub title: String,
    pub description: String,
    pub karma_required: u64,
    pub category: RewardCategory,
    #[serde(default)]
    pub image_url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReward {
    pub title: String,
    pub description: String,
    pub karma_required: u64,
    pub category: RewardCategory,
    #[serde(default)]
    pub image_url: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewReward {
    pub fn into_reward(self, id: RewardId, created_at: DateTime<Utc>) -> Reward {
        Reward {
            id,
            title: self.title,
            description: self.description,
            karma_required: self.karma_required,
            category: self.category,
            image_url: self.image_url,
            active: self.active,
            created_at,
        }
    }
}
