//! Behavior ingestion and the per-user feed.
//!
//! [`Ledger::record`] validates a request, prices it with the point policy
//! and hands it to the store, which persists the event and applies the
//! delta as one unit.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{FEED_LIMIT, MAX_BEHAVIOR_TYPE_LEN};
use crate::error::{KarmaError, NotFoundError, ValidationError};
use crate::policy::points_for;
use crate::traits::KarmaStore;
use crate::types::{Behavior, BehaviorDraft, BehaviorId, BehaviorType, Metadata, UserId};

/// Raw ingestion request, as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`; defaults to ingestion time.
    pub date: Option<String>,
}

/// The user's most recent events plus their unread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorFeed {
    pub behaviors: Vec<Behavior>,
    pub unread_count: u64,
}

/// An event just marked read, with the refreshed unread count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedRead {
    pub behavior: Behavior,
    pub unread_count: u64,
}

/// Validate a request and price it.
///
/// Unrecognized but well-formed kinds are accepted and score zero.
///
/// # Errors
///
/// - [`ValidationError::MissingType`] / [`ValidationError::MissingDescription`]
///   when a required field is absent or blank
/// - [`ValidationError::MalformedType`] when the tag is too long or has
///   characters outside `[A-Za-z0-9_-]`
/// - [`ValidationError::MalformedDate`] when `date` does not parse
pub fn validate(
    user: &UserId,
    request: BehaviorRequest,
    now: DateTime<Utc>,
) -> Result<BehaviorDraft, ValidationError> {
    let tag = request.kind.ok_or(ValidationError::MissingType)?;
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(ValidationError::MissingType);
    }
    if tag.len() > MAX_BEHAVIOR_TYPE_LEN
        || !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::MalformedType(tag.to_string()));
    }

    let description = request
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or(ValidationError::MissingDescription)?;

    let date = match request.date.as_deref().map(str::trim) {
        None | Some("") => now,
        Some(raw) => parse_date(raw)?,
    };

    let kind = BehaviorType::from(tag);
    Ok(BehaviorDraft {
        user: user.clone(),
        karma_points: points_for(&kind),
        kind,
        description,
        date,
        metadata: request.metadata.unwrap_or_default(),
    })
}

/// Parse an RFC 3339 timestamp, or a bare `YYYY-MM-DD` as midnight UTC.
fn parse_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ValidationError::MalformedDate(raw.to_string()))
}

/// Behavior ingestion and feed operations for one store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn KarmaStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KarmaStore>) -> Self {
        Self { store }
    }

    /// Validate, price and append an event, moving the owner's score.
    pub fn record(
        &self,
        user: &UserId,
        request: BehaviorRequest,
        now: DateTime<Utc>,
    ) -> Result<Behavior, KarmaError> {
        let draft = validate(user, request, now)?;
        self.store.append(draft)
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Behavior>, KarmaError> {
        self.store.recent(user, limit)
    }

    /// The user-facing feed: the latest [`FEED_LIMIT`] events and the unread count.
    pub fn feed(&self, user: &UserId) -> Result<BehaviorFeed, KarmaError> {
        Ok(BehaviorFeed {
            behaviors: self.store.recent(user, FEED_LIMIT)?,
            unread_count: self.store.count_unread(user)?,
        })
    }

    pub fn count_unread(&self, user: &UserId) -> Result<u64, KarmaError> {
        self.store.count_unread(user)
    }

    /// Mark one of the user's events read.
    ///
    /// # Errors
    ///
    /// - [`NotFoundError::Behavior`] if the user owns no event with that id
    pub fn mark_read(&self, user: &UserId, id: BehaviorId) -> Result<MarkedRead, KarmaError> {
        let behavior = self
            .store
            .mark_read(user, id)?
            .ok_or(NotFoundError::Behavior(id))?;
        Ok(MarkedRead {
            behavior,
            unread_count: self.store.count_unread(user)?,
        })
    }

    /// Mark every unread event of the user read; returns how many changed.
    pub fn mark_all_read(&self, user: &UserId) -> Result<u64, KarmaError> {
        self.store.mark_all_read(user)
    }
}
