use crate::config::DatabaseConfig;
use crate::errors::{Result, WalletError};
use crate::models::{NewWallet, Transaction, TransactionRow, Wallet, WalletId, WalletRow};
use crate::repository::LedgerRepository;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Connection, Executor, PgConnection};
use std::time::Duration;
use tracing::{error, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const WALLET_EXTERNAL_ID_KEY: &str = "wallets_external_id_key";
const TRANSACTION_FINGERPRINT_KEY: &str = "wallet_transactions_fingerprint_key";
const TRANSACTION_REF_NO_KEY: &str = "wallet_transactions_wallet_ref_no_key";

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// How a failed statement relates to the ledger rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageFailure {
    UniqueViolation(&'static str),
    ConcurrentUpdate,
    Other,
}

fn classify(err: &sqlx::Error) -> StorageFailure {
    let Some(db_err) = err.as_database_error() else {
        return StorageFailure::Other;
    };

    if matches!(
        db_err.code().as_deref(),
        Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
    ) {
        return StorageFailure::ConcurrentUpdate;
    }

    if db_err.is_unique_violation() {
        return match db_err.constraint() {
            Some(WALLET_EXTERNAL_ID_KEY) => StorageFailure::UniqueViolation(WALLET_EXTERNAL_ID_KEY),
            Some(TRANSACTION_FINGERPRINT_KEY) => {
                StorageFailure::UniqueViolation(TRANSACTION_FINGERPRINT_KEY)
            }
            Some(TRANSACTION_REF_NO_KEY) => StorageFailure::UniqueViolation(TRANSACTION_REF_NO_KEY),
            _ => StorageFailure::Other,
        };
    }

    StorageFailure::Other
}

/// Log the raw error and hand back an opaque infrastructure failure.
fn infrastructure(operation: &'static str, err: sqlx::Error) -> WalletError {
    error!(operation, error = %err, "Storage operation failed");
    WalletError::Infrastructure { operation }
}

/// PostgreSQL implementation of [`LedgerRepository`]
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| infrastructure("connect", e))?;

        Ok(PgLedgerRepository { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgLedgerRepository { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| infrastructure("migrate", e.into()))?;
        info!("Wallet ledger schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn create_wallet(&self, wallet: NewWallet) -> Result<Wallet> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| infrastructure("create_wallet", e))?;

        let id: WalletId = match sqlx::query_scalar(
            r#"
            INSERT INTO wallets (external_id, labels, created)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&wallet.external_id)
        .bind(Json(&wallet.labels))
        .bind(wallet.created)
        .fetch_one(&mut *tx)
        .await
        {
            Ok(id) => id,
            Err(e) => {
                return Err(match classify(&e) {
                    StorageFailure::UniqueViolation(WALLET_EXTERNAL_ID_KEY) => {
                        WalletError::WalletAlreadyExists(wallet.external_id)
                    }
                    _ => infrastructure("create_wallet", e),
                });
            }
        };

        sqlx::query("INSERT INTO wallet_balances (wallet_id, amount) VALUES ($1, $2)")
            .bind(id)
            .bind(Decimal::ZERO)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure("create_wallet", e))?;

        tx.commit()
            .await
            .map_err(|e| infrastructure("create_wallet", e))?;

        Ok(wallet.with_id(id))
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, external_id, labels, created FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infrastructure("get_wallet", e))?;

        Ok(row.map(Wallet::from))
    }

    async fn get_wallet_balance(&self, wallet_id: WalletId) -> Result<Option<Decimal>> {
        sqlx::query_scalar("SELECT amount FROM wallet_balances WHERE wallet_id = $1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| infrastructure("get_wallet_balance", e))
    }

    async fn get_latest_transaction(&self, wallet_id: WalletId) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, wallet_id, ref_no, amount, description, labels, fingerprint,
                   created, old_balance, new_balance
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY ref_no DESC
            LIMIT 1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| infrastructure("get_latest_transaction", e))?;

        Ok(row.map(Transaction::from))
    }

    async fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM wallet_transactions WHERE fingerprint = $1)",
        )
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| infrastructure("fingerprint_exists", e))
    }

    async fn append_transaction(&self, transaction: &Transaction) -> Result<()> {
        let wallet_id = transaction.wallet_id;
        let on_write_error = |e: sqlx::Error| match classify(&e) {
            StorageFailure::UniqueViolation(TRANSACTION_FINGERPRINT_KEY) => {
                WalletError::DuplicateFingerprint(transaction.fingerprint.clone())
            }
            StorageFailure::UniqueViolation(TRANSACTION_REF_NO_KEY)
            | StorageFailure::ConcurrentUpdate => {
                warn!(wallet_id, ref_no = transaction.ref_no, error = %e, "Lost append race");
                WalletError::ConsistencyConflict(wallet_id)
            }
            _ => infrastructure("append_transaction", e),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| infrastructure("append_transaction", e))?;

        (&mut *tx)
            .execute("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .await
            .map_err(|e| infrastructure("append_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, wallet_id, ref_no, amount, description, labels,
                fingerprint, created, old_balance, new_balance
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transaction.id)
        .bind(wallet_id)
        .bind(transaction.ref_no)
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(Json(&transaction.labels))
        .bind(&transaction.fingerprint)
        .bind(transaction.created)
        .bind(transaction.old_balance)
        .bind(transaction.new_balance)
        .execute(&mut *tx)
        .await
        .map_err(on_write_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE wallet_balances
            SET amount = $1
            WHERE wallet_id = $2 AND amount = $3
            "#,
        )
        .bind(transaction.new_balance)
        .bind(wallet_id)
        .bind(transaction.old_balance)
        .execute(&mut *tx)
        .await
        .map_err(on_write_error)?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| infrastructure("append_transaction", e))?;
            warn!(
                wallet_id,
                ref_no = transaction.ref_no,
                expected_balance = %transaction.old_balance,
                "Balance guard rejected append"
            );
            return Err(WalletError::ConsistencyConflict(wallet_id));
        }

        tx.commit().await.map_err(on_write_error)?;

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure("health_check", e))?;
        Ok(())
    }
}

/// Create the configured database, then apply the schema.
pub async fn init_database(config: &DatabaseConfig) -> anyhow::Result<()> {
    let mut conn = PgConnection::connect_with(&config.server_options()).await?;
    conn.execute(format!("CREATE DATABASE {}", quote_identifier(&config.name)).as_str())
        .await?;
    conn.close().await?;
    info!("Database {} is created", config.name);

    let repository = PgLedgerRepository::new(config).await?;
    repository.migrate().await?;
    Ok(())
}

pub async fn drop_database(config: &DatabaseConfig) -> anyhow::Result<()> {
    let mut conn = PgConnection::connect_with(&config.server_options()).await?;
    conn.execute(format!("DROP DATABASE IF EXISTS {}", quote_identifier(&config.name)).as_str())
        .await?;
    conn.close().await?;
    info!("Database {} is dropped", config.name);
    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl DatabaseConfig {
    /// Options for the ledger database itself
    pub fn connect_options(&self) -> PgConnectOptions {
        self.server_options().database(&self.name)
    }

    /// Options for the server's maintenance database, used to create or drop
    /// the ledger database.
    pub fn server_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.maintenance_database)
    }
}
