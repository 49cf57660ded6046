//! Out-of-band score reconciliation.
//!
//! A crash between an event write and its increment leaves a user's score
//! behind the ledger. [`audit`] finds such users by replaying the ledger sum;
//! [`repair`] closes the gap through the atomic increment. Neither runs on
//! the request path.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::KarmaError;
use crate::traits::KarmaStore;
use crate::types::UserId;

/// A user whose stored score differs from the ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDrift {
    pub user_id: UserId,
    pub stored: i64,
    pub ledger_total: i64,
}

impl ScoreDrift {
    /// Delta that brings the stored score back to the ledger sum.
    pub fn correction(&self) -> i64 {
        self.ledger_total - self.stored
    }
}

/// Every user whose stored score disagrees with their ledger.
///
/// Concurrent appends can show up as transient drift; run this while writes
/// are quiesced for an exact answer.
pub fn audit(store: &dyn KarmaStore) -> Result<Vec<ScoreDrift>, KarmaError> {
    let mut drifted = Vec::new();
    for user in store.list_users()? {
        let ledger_total = store.ledger_total(&user.id)?;
        if ledger_total != user.karma_score {
            warn!(
                user = %user.id,
                stored = user.karma_score,
                ledger_total,
                "karma score drift"
            );
            drifted.push(ScoreDrift {
                user_id: user.id,
                stored: user.karma_score,
                ledger_total,
            });
        }
    }
    Ok(drifted)
}

/// Apply each drift's correction. Returns the number of users repaired.
pub fn repair(store: &dyn KarmaStore, drifts: &[ScoreDrift]) -> Result<usize, KarmaError> {
    for drift in drifts {
        store.apply_delta(&drift.user_id, drift.correction())?;
    }
    info!(repaired = drifts.len(), "karma scores reconciled");
    Ok(drifts.len())
}
