//! Storage boundary of the wallet ledger.
//!
//! Implementations must provide atomic multi-statement units and enforce:
//! - unique wallet `external_id`
//! - unique transaction `fingerprint`
//! - unique `(wallet_id, ref_no)`
//!
//! and classify every failure into a [`WalletError`](crate::errors::WalletError)
//! kind. Raw storage errors never cross this boundary.

use crate::errors::Result;
use crate::models::{NewWallet, Transaction, Wallet, WalletId};
use async_trait::async_trait;
use rust_decimal::Decimal;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Insert the wallet together with a zero balance row.
    ///
    /// Fails with `WalletAlreadyExists` on an external id collision.
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet>;

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>>;

    /// Materialized balance; `None` when the wallet does not exist.
    async fn get_wallet_balance(&self, wallet_id: WalletId) -> Result<Option<Decimal>>;

    /// Transaction with the highest `ref_no` for the wallet.
    async fn get_latest_transaction(&self, wallet_id: WalletId) -> Result<Option<Transaction>>;

    /// Whether any stored transaction carries `fingerprint`.
    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool>;

    /// Insert `transaction` and move the wallet balance from
    /// `transaction.old_balance` to `transaction.new_balance` as one unit.
    ///
    /// The balance update is a compare-and-swap: if the stored balance no
    /// longer equals `old_balance`, nothing is written and the call fails with
    /// `ConsistencyConflict`. A `(wallet_id, ref_no)` collision is also a
    /// `ConsistencyConflict`; a fingerprint collision is `DuplicateFingerprint`.
    async fn append_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Cheap round trip proving the store is reachable.
    async fn health_check(&self) -> Result<()>;
}
