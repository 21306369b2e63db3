//! Wallet Engine
//!
//! Per-wallet append-only money ledgers. Every accepted transaction takes the
//! next gap-free `ref_no` of its wallet and moves the materialized wallet
//! balance from `old_balance` to `new_balance` in the same atomic unit.
//!
//! # Invariants
//!
//! - `ref_no` values of a wallet are exactly `1..=n`
//! - wallet balance == `new_balance` of the highest `ref_no` (0 without transactions)
//! - fingerprints are unique across all transactions
//! - no stored transaction has a negative `new_balance`
//!
//! Concurrent writers to one wallet are reconciled optimistically: the
//! balance update is a compare-and-swap against the balance the writer read,
//! and the loser gets [`WalletError::ConsistencyConflict`].

pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod retry;
pub mod services;

pub use config::Config;
pub use errors::{Result, WalletError};
pub use repository::LedgerRepository;
pub use services::WalletService;
