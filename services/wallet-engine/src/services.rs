use crate::errors::{Result, WalletError};
use crate::models::{
    is_storable_amount, ledger_now, CreateTransactionRequest, CreateWalletRequest, NewWallet,
    Transaction, Wallet, WalletId, MONEY_SCALE,
};
use crate::repository::LedgerRepository;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Wallet ledger service: decides whether a transaction may be appended and
/// at which position.
///
/// Holds no state between calls. Concurrent appends to one wallet are
/// reconciled by the repository's compare-and-swap on the balance row, so no
/// lock is taken across the read-compute-write cycle. Conflicts are reported,
/// never retried here.
pub struct WalletService {
    repository: Arc<dyn LedgerRepository>,
}

impl WalletService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        WalletService { repository }
    }

    pub async fn create_wallet(&self, request: CreateWalletRequest) -> Result<Wallet> {
        request.validate()?;

        let wallet = self
            .repository
            .create_wallet(NewWallet {
                external_id: request.external_id,
                labels: request.labels,
                created: ledger_now(),
            })
            .await?;

        info!("Created wallet {} (external id: {})", wallet.id, wallet.external_id);

        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: WalletId) -> Result<Wallet> {
        self.repository
            .get_wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    pub async fn get_wallet_balance(&self, wallet_id: WalletId) -> Result<Decimal> {
        self.repository
            .get_wallet_balance(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    pub async fn get_latest_transaction(&self, wallet_id: WalletId) -> Result<Transaction> {
        self.repository
            .get_latest_transaction(wallet_id)
            .await?
            .ok_or(WalletError::TransactionNotFound(wallet_id))
    }

    pub async fn health_check(&self) -> Result<()> {
        self.repository.health_check().await
    }

    /// Append a transaction to the wallet's ledger.
    ///
    /// Reads the wallet and its latest transaction, computes the next `ref_no`
    /// and balances, then asks the repository to commit it guarded by the
    /// balance that was read.
    pub async fn create_transaction(
        &self,
        wallet_id: WalletId,
        request: CreateTransactionRequest,
    ) -> Result<Transaction> {
        request.validate()?;
        let fingerprint = request.fingerprint.clone();

        if self.repository.get_wallet(wallet_id).await?.is_none() {
            info!(wallet_id, %fingerprint, "Transaction rejected: wallet not found");
            return Err(WalletError::WalletNotFound(wallet_id));
        }

        let latest = self.repository.get_latest_transaction(wallet_id).await?;
        let transaction = match next_transaction(wallet_id, latest.as_ref(), request, ledger_now())
        {
            Ok(transaction) => transaction,
            // A replay of an accepted debit may no longer fit the balance;
            // it must still be reported as a replay.
            Err(e @ WalletError::InsufficientBalance { .. }) => {
                if self.repository.fingerprint_exists(&fingerprint).await? {
                    info!(wallet_id, %fingerprint, "Transaction rejected: fingerprint already used");
                    return Err(WalletError::DuplicateFingerprint(fingerprint));
                }
                info!(wallet_id, %fingerprint, error = %e, "Transaction rejected");
                return Err(e);
            }
            Err(e) => {
                info!(wallet_id, %fingerprint, error = %e, "Transaction rejected");
                return Err(e);
            }
        };

        match self.repository.append_transaction(&transaction).await {
            Ok(()) => {
                info!(
                    wallet_id,
                    %fingerprint,
                    ref_no = transaction.ref_no,
                    new_balance = %transaction.new_balance,
                    "Transaction committed"
                );
                Ok(transaction)
            }
            Err(e @ WalletError::ConsistencyConflict(_)) => {
                warn!(
                    wallet_id,
                    %fingerprint,
                    ref_no = transaction.ref_no,
                    "Transaction lost a concurrent update"
                );
                Err(e)
            }
            Err(e) => {
                info!(wallet_id, %fingerprint, error = %e, "Transaction not committed");
                Err(e)
            }
        }
    }
}

/// Build the transaction that follows `latest` in the wallet's sequence.
///
/// A wallet without transactions starts from `ref_no` 0 and a zero balance.
fn next_transaction(
    wallet_id: WalletId,
    latest: Option<&Transaction>,
    request: CreateTransactionRequest,
    created: DateTime<Utc>,
) -> Result<Transaction> {
    let (base_ref_no, old_balance) = latest
        .map(|t| (t.ref_no, t.new_balance))
        .unwrap_or((0, Decimal::ZERO));

    let new_balance = old_balance
        .checked_add(request.amount)
        .filter(is_storable_amount)
        .ok_or_else(|| {
            WalletError::Validation(format!(
                "balance {} plus amount {} is out of range",
                old_balance, request.amount
            ))
        })?;

    if new_balance < Decimal::ZERO {
        return Err(WalletError::InsufficientBalance {
            available: old_balance,
            requested: request.amount,
        });
    }

    Ok(Transaction {
        id: Uuid::new_v4(),
        wallet_id,
        ref_no: base_ref_no + 1,
        amount: to_money_scale(request.amount),
        description: request.description,
        labels: request.labels,
        fingerprint: request.fingerprint,
        created,
        old_balance: to_money_scale(old_balance),
        new_balance: to_money_scale(new_balance),
    })
}

/// Same scale as the `NUMERIC(14, 2)` columns, so a returned transaction
/// serializes exactly like the stored one.
fn to_money_scale(mut amount: Decimal) -> Decimal {
    amount.rescale(MONEY_SCALE);
    amount
}
