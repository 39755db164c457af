//! crates/ats_gate_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, AccountCredentials, CheckoutSession, DocumentImage, NewUsageRecord, Plan,
    RecordedAnalysis, UsageRecord,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts a new account. Fails with `PortError::Conflict` if the identity is taken.
    async fn create_account(
        &self,
        identity: &str,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Account>;

    async fn find_credentials(&self, identity: &str) -> PortResult<Option<AccountCredentials>>;

    async fn get_account(&self, account_id: Uuid) -> PortResult<Account>;

    async fn touch_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live session to its account. Unknown or expired sessions are `Unauthorized`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn count_for_account(&self, account_id: Uuid) -> PortResult<u64>;

    /// Appends `record` only if the account holds fewer than `quota` records,
    /// as a single atomic step. Returns `None` when the quota is already used up;
    /// otherwise the stored record with the usage counted in that same step.
    async fn append_within_quota(
        &self,
        record: NewUsageRecord,
        quota: u32,
    ) -> PortResult<Option<RecordedAnalysis>>;

    /// All records for an account, newest first.
    async fn list_for_account(&self, account_id: Uuid) -> PortResult<Vec<UsageRecord>>;
}

//=========================================================================================
// External Service Ports
//=========================================================================================

#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Turns an instruction, a page image and free-text context into generated text.
    async fn generate(
        &self,
        instruction: &str,
        image: &DocumentImage,
        context_text: &str,
    ) -> PortResult<String>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Renders the first page of a PDF into a still image.
    async fn render_first_page(&self, pdf: &[u8]) -> PortResult<DocumentImage>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn start_checkout(&self, plan: Plan, account: &Account) -> PortResult<CheckoutSession>;
}
