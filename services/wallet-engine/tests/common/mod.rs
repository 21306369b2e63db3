// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use wallet_engine::models::{
    CreateTransactionRequest, CreateWalletRequest, Labels, NewWallet, Transaction, Wallet,
    WalletId,
};
use wallet_engine::{LedgerRepository, Result, WalletError};

#[derive(Default)]
struct LedgerState {
    next_wallet_id: WalletId,
    wallets: BTreeMap<WalletId, Wallet>,
    balances: HashMap<WalletId, Decimal>,
    transactions: Vec<Transaction>,
}

/// Storage double with the same uniqueness constraints and balance
/// compare-and-swap as the PostgreSQL schema. Each call is one atomic unit.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored transactions of a wallet in `ref_no` order
    pub fn transactions(&self, wallet_id: WalletId) -> Vec<Transaction> {
        let state = self.state.lock().unwrap();
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|t| t.ref_no);
        transactions
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedger {
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet> {
        let mut state = self.state.lock().unwrap();
        if state
            .wallets
            .values()
            .any(|w| w.external_id == wallet.external_id)
        {
            return Err(WalletError::WalletAlreadyExists(wallet.external_id));
        }

        state.next_wallet_id += 1;
        let wallet = wallet.with_id(state.next_wallet_id);
        state.wallets.insert(wallet.id, wallet.clone());
        state.balances.insert(wallet.id, Decimal::ZERO);
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.state.lock().unwrap().wallets.get(&wallet_id).cloned())
    }

    async fn get_wallet_balance(&self, wallet_id: WalletId) -> Result<Option<Decimal>> {
        Ok(self.state.lock().unwrap().balances.get(&wallet_id).copied())
    }

    async fn get_latest_transaction(&self, wallet_id: WalletId) -> Result<Option<Transaction>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .max_by_key(|t| t.ref_no)
            .cloned())
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.transactions.iter().any(|t| t.fingerprint == fingerprint))
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state
            .transactions
            .iter()
            .any(|t| t.fingerprint == transaction.fingerprint)
        {
            return Err(WalletError::DuplicateFingerprint(
                transaction.fingerprint.clone(),
            ));
        }

        if state
            .transactions
            .iter()
            .any(|t| t.wallet_id == transaction.wallet_id && t.ref_no == transaction.ref_no)
        {
            return Err(WalletError::ConsistencyConflict(transaction.wallet_id));
        }

        match state.balances.get_mut(&transaction.wallet_id) {
            Some(balance) if *balance == transaction.old_balance => {
                *balance = transaction.new_balance;
            }
            _ => return Err(WalletError::ConsistencyConflict(transaction.wallet_id)),
        }

        state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Holds every writer after its "latest transaction" read until `writers`
/// of them have read, so all of them compute from the same stale state.
pub struct StaleReadLedger {
    inner: Arc<dyn LedgerRepository>,
    barrier: Barrier,
}

impl StaleReadLedger {
    pub fn new(inner: Arc<dyn LedgerRepository>, writers: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(writers),
        }
    }
}

#[async_trait]
impl LedgerRepository for StaleReadLedger {
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet> {
        self.inner.create_wallet(wallet).await
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        self.inner.get_wallet(wallet_id).await
    }

    async fn get_wallet_balance(&self, wallet_id: WalletId) -> Result<Option<Decimal>> {
        self.inner.get_wallet_balance(wallet_id).await
    }

    async fn get_latest_transaction(&self, wallet_id: WalletId) -> Result<Option<Transaction>> {
        let latest = self.inner.get_latest_transaction(wallet_id).await;
        self.barrier.wait().await;
        latest
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool> {
        self.inner.fingerprint_exists(fingerprint).await
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.inner.append_transaction(transaction).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

pub fn wallet_request(external_id: &str) -> CreateWalletRequest {
    CreateWalletRequest {
        external_id: external_id.to_string(),
        labels: Labels::new(),
    }
}

pub fn transaction_request(amount: Decimal, fingerprint: &str) -> CreateTransactionRequest {
    CreateTransactionRequest {
        amount,
        description: format!("transaction {}", fingerprint),
        labels: Labels::from([("source".to_string(), "test".to_string())]),
        fingerprint: fingerprint.to_string(),
    }
}

/// Asserts the ledger invariants for one wallet
pub fn assert_ledger_consistent(transactions: &[Transaction], balance: Decimal) {
    for (index, t) in transactions.iter().enumerate() {
        assert_eq!(t.ref_no, index as i64 + 1, "ref_no sequence has a gap");
        assert_eq!(t.new_balance, t.old_balance + t.amount);
        assert!(t.new_balance >= Decimal::ZERO, "negative balance stored");
        if index > 0 {
            assert_eq!(t.old_balance, transactions[index - 1].new_balance);
        }
    }

    let expected = transactions
        .last()
        .map(|t| t.new_balance)
        .unwrap_or(Decimal::ZERO);
    assert_eq!(balance, expected, "materialized balance drifted");
}
