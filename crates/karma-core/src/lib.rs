//! # karma-core
//! Foundation types, point policy, store traits and services for the Karma
//! behavior ledger.

pub mod constants;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod policy;
pub mod reconcile;
pub mod reporting;
pub mod rewards;
pub mod traits;
pub mod types;
