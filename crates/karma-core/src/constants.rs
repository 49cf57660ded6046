//! Scoring and reporting constants. All point values are signed karma deltas.

/// Points for paying a bill on or before its due date.
pub const POINTS_PAYMENT_ON_TIME: i64 = 10;

/// Points for a missed or late payment.
pub const POINTS_PAYMENT_LATE: i64 = -15;

/// Points for keeping credit utilization low.
pub const POINTS_CREDIT_UTILIZATION_LOW: i64 = 5;

/// Points for running credit utilization high.
pub const POINTS_CREDIT_UTILIZATION_HIGH: i64 = -5;

/// Points for opening a new credit account.
pub const POINTS_NEW_CREDIT_ACCOUNT: i64 = 3;

/// Points for a credit check or inquiry.
pub const POINTS_CREDIT_CHECK: i64 = -2;

/// Number of events returned by the user-facing behavior feed.
pub const FEED_LIMIT: usize = 50;

/// Trailing window, in days, for recent activity and top performers.
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

/// Number of entries in the top-performers ranking.
pub const TOP_PERFORMER_LIMIT: usize = 5;

/// Maximum byte length of a behavior type tag.
pub const MAX_BEHAVIOR_TYPE_LEN: usize = 64;

/// Karma histogram buckets as `(label, min, max)`; `None` means unbounded.
///
/// Buckets are disjoint and cover every non-negative score. Negative scores
/// fall into no bucket.
pub const KARMA_BUCKETS: [(&str, i64, Option<i64>); 5] = [
    ("0-50", 0, Some(50)),
    ("51-100", 51, Some(100)),
    ("101-250", 101, Some(250)),
    ("251-500", 251, Some(500)),
    ("500+", 501, None),
];
