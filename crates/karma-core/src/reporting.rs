//! Read-only reporting: per-user summaries and the global analytics view.
//!
//! The aggregation functions are pure over snapshots read from the store.
//! Nothing here writes, so an abandoned query leaves no partial state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ACTIVITY_WINDOW_DAYS, KARMA_BUCKETS, TOP_PERFORMER_LIMIT};
use crate::error::{KarmaError, NotFoundError};
use crate::traits::KarmaStore;
use crate::types::{Behavior, BehaviorType, TypeTotals, User, UserId};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// A user's live score and per-kind totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub current_karma: i64,
    pub behavior_summary: BTreeMap<BehaviorType, TypeTotals>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_users: u64,
    pub avg_karma_score: i64,
    pub total_behaviors: u64,
    /// Number of entries in `top_performers`, not a distinct-active count.
    pub active_users: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub karma_score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    pub range: String,
    pub count: u64,
    pub percentage: i64,
}

/// Events and net points for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub count: u64,
    pub karma_change: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub user_id: UserId,
    pub username: String,
    /// Sum of positive deltas in the window.
    pub karma_gained: i64,
    pub behavior_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAnalytics {
    pub summary: AnalyticsSummary,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub behavior_stats: BTreeMap<BehaviorType, TypeTotals>,
    pub karma_distribution: Vec<DistributionBucket>,
    pub recent_activity: Vec<DailyActivity>,
    pub top_performers: Vec<TopPerformer>,
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

/// Round half up toward positive infinity, like `Math.round`.
///
/// # Examples
///
/// ```
/// use karma_core::reporting::round_half_up;
///
/// assert_eq!(round_half_up(2.5), 3);
/// assert_eq!(round_half_up(-2.5), -2);
/// assert_eq!(round_half_up(33.333), 33);
/// ```
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Mean karma score rounded to the nearest integer; `0` with no users.
pub fn average_score(users: &[User]) -> i64 {
    if users.is_empty() {
        return 0;
    }
    let total: i128 = users.iter().map(|u| i128::from(u.karma_score)).sum();
    round_half_up(total as f64 / users.len() as f64)
}

/// Users by score descending. `users` must be in registration order; the
/// stable sort keeps that order among equal scores.
pub fn leaderboard(users: &[User]) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&User> = users.iter().collect();
    ranked.sort_by(|a, b| b.karma_score.cmp(&a.karma_score));
    ranked
        .into_iter()
        .map(|u| LeaderboardEntry {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            karma_score: u.karma_score,
            created_at: u.created_at,
        })
        .collect()
}

/// Histogram of scores over [`KARMA_BUCKETS`].
///
/// Percentages are relative to `users.len()`; negative scores are counted in
/// the total but fall into no bucket.
pub fn karma_distribution(users: &[User]) -> Vec<DistributionBucket> {
    let total = users.len();
    KARMA_BUCKETS
        .iter()
        .map(|&(label, min, max)| {
            let count = users
                .iter()
                .filter(|u| u.karma_score >= min && max.is_none_or(|m| u.karma_score <= m))
                .count();
            let percentage = if total > 0 {
                round_half_up(count as f64 / total as f64 * 100.0)
            } else {
                0
            };
            DistributionBucket {
                range: label.to_string(),
                count: count as u64,
                percentage,
            }
        })
        .collect()
}

/// Start of the trailing activity window ending at `now`.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(ACTIVITY_WINDOW_DAYS)
}

/// Day-bucketed counts and net points for events at or after `since`,
/// ascending by day.
pub fn recent_activity(behaviors: &[Behavior], since: DateTime<Utc>) -> Vec<DailyActivity> {
    let mut days: BTreeMap<NaiveDate, (u64, i64)> = BTreeMap::new();
    for behavior in behaviors.iter().filter(|b| b.date >= since) {
        let day = days.entry(behavior.date.date_naive()).or_default();
        day.0 += 1;
        day.1 += behavior.karma_points;
    }
    days.into_iter()
        .map(|(date, (count, karma_change))| DailyActivity {
            date: date.format("%Y-%m-%d").to_string(),
            count,
            karma_change,
        })
        .collect()
}

/// Top `limit` users by gross positive gain among events at or after `since`.
///
/// Only events with `karma_points > 0` count. Ties keep the order in which
/// each user first appears in `behaviors`. Users missing from `users` are
/// dropped after ranking, so fewer than `limit` entries may come back.
pub fn top_performers(
    behaviors: &[Behavior],
    users: &[User],
    since: DateTime<Utc>,
    limit: usize,
) -> Vec<TopPerformer> {
    let mut order: Vec<&UserId> = Vec::new();
    let mut gains: HashMap<&UserId, (i64, u64)> = HashMap::new();
    for behavior in behaviors
        .iter()
        .filter(|b| b.date >= since && b.karma_points > 0)
    {
        let entry = gains.entry(&behavior.user).or_insert_with(|| {
            order.push(&behavior.user);
            (0, 0)
        });
        entry.0 += behavior.karma_points;
        entry.1 += 1;
    }

    let mut ranked: Vec<(&UserId, i64, u64)> = order
        .into_iter()
        .map(|id| {
            let (gained, count) = gains[id];
            (id, gained, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);

    let names: HashMap<&UserId, &str> = users.iter().map(|u| (&u.id, u.username.as_str())).collect();
    ranked
        .into_iter()
        .filter_map(|(id, karma_gained, behavior_count)| {
            names.get(id).map(|name| TopPerformer {
                user_id: id.clone(),
                username: name.to_string(),
                karma_gained,
                behavior_count,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Reporting over one store.
#[derive(Clone)]
pub struct Reporter {
    store: Arc<dyn KarmaStore>,
}

impl Reporter {
    pub fn new(store: Arc<dyn KarmaStore>) -> Self {
        Self { store }
    }

    /// Live score plus per-kind totals for one user.
    pub fn summary_for(&self, user: &UserId) -> Result<UserSummary, KarmaError> {
        let owner = self
            .store
            .get_user(user)?
            .ok_or_else(|| NotFoundError::User(user.clone()))?;
        Ok(UserSummary {
            current_karma: owner.karma_score,
            behavior_summary: self.store.group_by_type(Some(user))?,
        })
    }

    /// The admin dashboard view, with the activity window ending at `now`.
    pub fn global_analytics(&self, now: DateTime<Utc>) -> Result<GlobalAnalytics, KarmaError> {
        let users = self.store.list_users()?;
        let since = window_start(now);
        let in_window = self.store.behaviors_since(since)?;

        let top = top_performers(&in_window, &users, since, TOP_PERFORMER_LIMIT);
        let summary = AnalyticsSummary {
            total_users: users.len() as u64,
            avg_karma_score: average_score(&users),
            total_behaviors: self.store.count_behaviors()?,
            active_users: top.len() as u64,
        };

        Ok(GlobalAnalytics {
            summary,
            leaderboard: leaderboard(&users),
            behavior_stats: self.store.group_by_type(None)?,
            karma_distribution: karma_distribution(&users),
            recent_activity: recent_activity(&in_window, since),
            top_performers: top,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::{BehaviorId, Metadata, Role};

    fn user(id: &str, score: i64, ordinal: u64) -> User {
        User {
            id: UserId::from(id),
            username: format!("{id}-name"),
            email: format!("{id}@example.com"),
            role: Role::User,
            karma_score: score,
            unlocked_rewards: Default::default(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ordinal,
        }
    }

    fn users_with(scores: &[i64]) -> Vec<User> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| user(&format!("u{i}"), s, i as u64))
            .collect()
    }

    fn event(id: u64, owner: &str, points: i64, date: DateTime<Utc>) -> Behavior {
        Behavior {
            id: BehaviorId(id),
            user: UserId::from(owner),
            kind: BehaviorType::PaymentOnTime,
            description: "e".into(),
            karma_points: points,
            date,
            is_read: false,
            metadata: Metadata::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn average_rounds_and_handles_empty() {
        assert_eq!(average_score(&[]), 0);
        assert_eq!(average_score(&users_with(&[1, 2])), 2);
        assert_eq!(average_score(&users_with(&[10, 20, 31])), 20);
        assert_eq!(average_score(&users_with(&[-3, -2])), -2);
    }

    #[test]
    fn distribution_even_split() {
        let buckets = karma_distribution(&users_with(&[0, 60, 120, 300, 600]));
        let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
        let pct: Vec<i64> = buckets.iter().map(|b| b.percentage).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 1]);
        assert_eq!(pct, vec![20, 20, 20, 20, 20]);
        let labels: Vec<&str> = buckets.iter().map(|b| b.range.as_str()).collect();
        assert_eq!(labels, vec!["0-50", "51-100", "101-250", "251-500", "500+"]);
    }

    #[test]
    fn distribution_edges() {
        let buckets = karma_distribution(&users_with(&[50, 51, 100, 101, 250, 251, 500, 501]));
        let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 2, 2, 1]);
    }

    #[test]
    fn distribution_skips_negative_scores() {
        let buckets = karma_distribution(&users_with(&[-10, 10, 20]));
        let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 0, 0, 0, 0]);
        assert_eq!(buckets[0].percentage, 67);
    }

    #[test]
    fn distribution_without_users() {
        let buckets = karma_distribution(&[]);
        assert_eq!(buckets.len(), 5);
        assert!(buckets.iter().all(|b| b.count == 0 && b.percentage == 0));
    }

    #[test]
    fn leaderboard_is_stable_on_ties() {
        let users = users_with(&[5, 9, 5, 12]);
        let ids: Vec<String> = leaderboard(&users).into_iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec!["u3", "u1", "u0", "u2"]);
    }

    #[test]
    fn activity_buckets_by_day_within_window() {
        let n = now();
        let since = window_start(n);
        let events = vec![
            event(1, "a", 10, n - Duration::days(31)),
            event(2, "a", 10, Utc.with_ymd_and_hms(2024, 6, 29, 23, 59, 0).unwrap()),
            event(3, "b", -15, Utc.with_ymd_and_hms(2024, 6, 29, 0, 1, 0).unwrap()),
            event(4, "b", 5, Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap()),
        ];
        let activity = recent_activity(&events, since);
        assert_eq!(
            activity,
            vec![
                DailyActivity { date: "2024-06-02".into(), count: 1, karma_change: 5 },
                DailyActivity { date: "2024-06-29".into(), count: 2, karma_change: -5 },
            ]
        );
    }

    #[test]
    fn top_performers_counts_gross_gain_only() {
        let n = now();
        let since = window_start(n);
        let users = vec![user("a", 0, 0), user("b", 0, 1), user("c", 0, 2)];
        let events = vec![
            event(1, "a", 10, n),
            event(2, "a", -15, n),
            event(3, "b", 5, n),
            event(4, "c", 10, n),
            event(5, "c", 10, n - Duration::days(40)),
        ];
        let top = top_performers(&events, &users, since, 5);
        let ranked: Vec<(&str, i64, u64)> = top
            .iter()
            .map(|t| (t.user_id.as_str(), t.karma_gained, t.behavior_count))
            .collect();
        assert_eq!(ranked, vec![("a", 10, 1), ("c", 10, 1), ("b", 5, 1)]);
        assert_eq!(top[0].username, "a-name");
    }

    #[test]
    fn top_performers_truncates_and_drops_unknown_users() {
        let n = now();
        let users = users_with(&[0; 7]);
        let mut events: Vec<Behavior> = (0..7)
            .map(|i| event(i, &format!("u{i}"), 10 + i as i64, n))
            .collect();
        events.push(event(100, "ghost", 1000, n));
        let top = top_performers(&events, &users, window_start(n), 5);
        let ids: Vec<&str> = top.iter().map(|t| t.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u6", "u5", "u4", "u3"]);
    }
}
