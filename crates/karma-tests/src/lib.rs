//! Cross-crate test suite for the karma ledger.
//!
//! Integration tests under `tests/` drive the ledger, reporting engine and
//! reward gate through [`karma_node::KarmaService`] against both store
//! backends. Shared setup lives in [`helpers`].

pub mod helpers;
