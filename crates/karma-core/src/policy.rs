//! Point policy: the fixed mapping from behavior kind to karma delta.
//!
//! Pure and total. Points are computed once at ingestion and frozen on the
//! stored event, so a change here never rewrites history.

use crate::constants::{
    POINTS_CREDIT_CHECK, POINTS_CREDIT_UTILIZATION_HIGH, POINTS_CREDIT_UTILIZATION_LOW,
    POINTS_NEW_CREDIT_ACCOUNT, POINTS_PAYMENT_LATE, POINTS_PAYMENT_ON_TIME,
};
use crate::types::BehaviorType;

/// Signed karma delta for a behavior kind.
///
/// | Kind                      | Points |
/// |---------------------------|--------|
/// | `payment_on_time`         | +10    |
/// | `payment_late`            | -15    |
/// | `credit_utilization_low`  | +5     |
/// | `credit_utilization_high` | -5     |
/// | `new_credit_account`      | +3     |
/// | `credit_check`            | -2     |
/// | anything else             | 0      |
///
/// # Examples
///
/// ```
/// use karma_core::policy::points_for;
/// use karma_core::types::BehaviorType;
///
/// assert_eq!(points_for(&BehaviorType::PaymentOnTime), 10);
/// assert_eq!(points_for(&BehaviorType::PaymentLate), -15);
/// assert_eq!(points_for(&BehaviorType::from("birthday")), 0);
/// ```
pub fn points_for(kind: &BehaviorType) -> i64 {
    match kind {
        BehaviorType::PaymentOnTime => POINTS_PAYMENT_ON_TIME,
        BehaviorType::PaymentLate => POINTS_PAYMENT_LATE,
        BehaviorType::CreditUtilizationLow => POINTS_CREDIT_UTILIZATION_LOW,
        BehaviorType::CreditUtilizationHigh => POINTS_CREDIT_UTILIZATION_HIGH,
        BehaviorType::NewCreditAccount => POINTS_NEW_CREDIT_ACCOUNT,
        BehaviorType::CreditCheck => POINTS_CREDIT_CHECK,
        BehaviorType::Other(_) => 0,
    }
}
