use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Storage-assigned wallet identity
pub type WalletId = i64;

pub type Labels = HashMap<String, String>;

/// Fractional digits kept for every stored amount (`NUMERIC(14, 2)`)
pub const MONEY_SCALE: u32 = 2;

/// Upper bound (exclusive) on the absolute value of any amount or balance
pub const MAX_ABS_AMOUNT: i64 = 1_000_000_000_000;

pub const MAX_LABELS: u64 = 10;

/// Current time at the precision timestamps are persisted with, so a value
/// returned to the caller equals the one read back later.
pub fn ledger_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Whether `amount` is representable in the ledger's fixed-point columns.
pub fn is_storable_amount(amount: &Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE && amount.abs() < Decimal::from(MAX_ABS_AMOUNT)
}

fn validate_money_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if !is_storable_amount(amount) {
        let mut err = ValidationError::new("money_amount");
        err.message = Some(
            format!(
                "amount must have at most {} fractional digits and be below {} in magnitude",
                MONEY_SCALE, MAX_ABS_AMOUNT
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// An account holding a running balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub labels: Labels,
    pub external_id: String,
    pub created: DateTime<Utc>,
}

/// A wallet about to be persisted; storage assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWallet {
    pub external_id: String,
    pub labels: Labels,
    pub created: DateTime<Utc>,
}

impl NewWallet {
    pub fn with_id(self, id: WalletId) -> Wallet {
        Wallet {
            id,
            labels: self.labels,
            external_id: self.external_id,
            created: self.created,
        }
    }
}

/// One signed adjustment of a wallet balance, immutable once stored.
///
/// `new_balance == old_balance + amount` holds from construction on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub ref_no: i64,
    pub amount: Decimal,
    pub description: String,
    pub labels: Labels,
    pub fingerprint: String,
    pub created: DateTime<Utc>,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
}

/// Wallet creation request
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    #[validate(length(min = 1, max = 50))]
    pub external_id: String,
    // Spelled out: the validator derive only recognizes `length` on known collection names
    #[serde(default)]
    #[validate(length(max = 10))]
    pub labels: HashMap<String, String>,
}

/// Transaction request; the target wallet travels in the route.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[validate(custom = "validate_money_amount")]
    pub amount: Decimal,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub description: String,
    // Spelled out: the validator derive only recognizes `length` on known collection names
    #[serde(default)]
    #[validate(length(max = 10))]
    pub labels: HashMap<String, String>,
    #[validate(length(min = 1, max = 50))]
    pub fingerprint: String,
}

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: WalletId,
    pub external_id: String,
    pub labels: Json<Labels>,
    pub created: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            labels: row.labels.0,
            external_id: row.external_id,
            created: row.created,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub ref_no: i64,
    pub amount: Decimal,
    pub description: String,
    pub labels: Json<Labels>,
    pub fingerprint: String,
    pub created: DateTime<Utc>,
    pub old_balance: Decimal,
    pub new_balance: Decimal,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            wallet_id: row.wallet_id,
            ref_no: row.ref_no,
            amount: row.amount,
            description: row.description,
            labels: row.labels.0,
            fingerprint: row.fingerprint,
            created: row.created,
            old_balance: row.old_balance,
            new_balance: row.new_balance,
        }
    }
}
