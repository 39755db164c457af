//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the persistence ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use ats_gate_core::domain::{
    Account, AccountCredentials, NewUsageRecord, RecordedAnalysis, UsageRecord, UsageSummary,
};
use ats_gate_core::ports::{IdentityStore, PortError, PortResult, SessionStore, UsageLedger};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the identity, session and usage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    id: Uuid,
    identity: String,
    secret_hash: String,
    created_at: DateTime<Utc>,
    last_login_at: DateTime<Utc>,
}
impl AccountRecord {
    fn to_credentials(self) -> AccountCredentials {
        AccountCredentials {
            account: Account {
                id: self.id,
                identity: self.identity,
                created_at: self.created_at,
                last_login_at: self.last_login_at,
            },
            secret_hash: self.secret_hash,
        }
    }
}

#[derive(FromRow)]
struct UsageRecordRow {
    id: Uuid,
    account_id: Uuid,
    category: String,
    context_text: String,
    result_text: String,
    created_at: DateTime<Utc>,
}
impl UsageRecordRow {
    fn to_domain(self) -> PortResult<UsageRecord> {
        let category = self
            .category
            .parse()
            .map_err(|e: ats_gate_core::domain::UnknownCategory| {
                PortError::Unexpected(format!("usage record {}: {}", self.id, e))
            })?;
        Ok(UsageRecord {
            id: self.id,
            account_id: self.account_id,
            category,
            context_text: self.context_text,
            result_text: self.result_text,
            created_at: self.created_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, identity, secret_hash, created_at, last_login_at";
const USAGE_COLUMNS: &str = "id, account_id, category, context_text, result_text, created_at";

//=========================================================================================
// `IdentityStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityStore for DbAdapter {
    async fn create_account(
        &self,
        identity: &str,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "INSERT INTO accounts (id, identity, secret_hash, created_at, last_login_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(identity)
        .bind(secret_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                PortError::Conflict(format!("identity '{}' already exists", identity))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_credentials().account)
    }

    async fn find_credentials(&self, identity: &str) -> PortResult<Option<AccountCredentials>> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identity = $1"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(AccountRecord::to_credentials))
    }

    async fn get_account(&self, account_id: Uuid) -> PortResult<Account> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Account {} not found", account_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_credentials().account)
    }

    async fn touch_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let result = sqlx::query("UPDATE accounts SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Account {} not found", account_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, account_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(account_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let account_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT account_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        account_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `UsageLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl UsageLedger for DbAdapter {
    async fn count_for_account(&self, account_id: Uuid) -> PortResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usage_records WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }

    async fn append_within_quota(
        &self,
        record: NewUsageRecord,
        quota: u32,
    ) -> PortResult<Option<RecordedAnalysis>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Serializes concurrent appends for the same account.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(record.account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
        if locked.is_none() {
            return Err(PortError::NotFound(format!(
                "Account {} not found",
                record.account_id
            )));
        }

        let used: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM usage_records WHERE account_id = $1")
                .bind(record.account_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
        if used >= i64::from(quota) {
            tx.rollback().await.map_err(unexpected)?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, UsageRecordRow>(&format!(
            "INSERT INTO usage_records (id, account_id, category, context_text, result_text, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(record.account_id)
        .bind(record.category.as_str())
        .bind(&record.context_text)
        .bind(&record.result_text)
        .bind(record.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(Some(RecordedAnalysis {
            record: row.to_domain()?,
            usage: UsageSummary::new(used as u64 + 1, quota),
        }))
    }

    async fn list_for_account(&self, account_id: Uuid) -> PortResult<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRecordRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_records WHERE account_id = $1 ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        rows.into_iter().map(UsageRecordRow::to_domain).collect()
    }
}
