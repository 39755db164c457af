//! crates/ats_gate_core/src/memory.rs
//!
//! An in-process implementation of the persistence ports. Everything lives
//! behind one mutex, so `append_within_quota` is atomic the same way the
//! database transaction is.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, AccountCredentials, NewUsageRecord, RecordedAnalysis, UsageRecord, UsageSummary,
};
use crate::ports::{IdentityStore, PortError, PortResult, SessionStore, UsageLedger};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, AccountCredentials>,
    by_identity: HashMap<String, Uuid>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    usage: Vec<UsageRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn account_count(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.accounts.len(), inner.by_identity.len())
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| PortError::Unexpected("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_account(
        &self,
        identity: &str,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Account> {
        let mut inner = self.lock()?;
        if inner.by_identity.contains_key(identity) {
            return Err(PortError::Conflict(format!("identity '{}' already exists", identity)));
        }
        let account = Account {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            created_at: now,
            last_login_at: now,
        };
        inner.by_identity.insert(identity.to_string(), account.id);
        inner.accounts.insert(
            account.id,
            AccountCredentials {
                account: account.clone(),
                secret_hash: secret_hash.to_string(),
            },
        );
        Ok(account)
    }

    async fn find_credentials(&self, identity: &str) -> PortResult<Option<AccountCredentials>> {
        let inner = self.lock()?;
        Ok(inner
            .by_identity
            .get(identity)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn get_account(&self, account_id: Uuid) -> PortResult<Account> {
        self.lock()?
            .accounts
            .get(&account_id)
            .map(|c| c.account.clone())
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", account_id)))
    }

    async fn touch_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        let mut inner = self.lock()?;
        let creds = inner
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", account_id)))?;
        creds.account.last_login_at = at;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_auth_session(
        &self,
        session_id: &str,
        account_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.lock()?
            .sessions
            .insert(session_id.to_string(), (account_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.lock()?.sessions.get(session_id) {
            Some((account_id, expires_at)) if *expires_at > Utc::now() => Ok(*account_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.lock()?.sessions.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl UsageLedger for MemoryStore {
    async fn count_for_account(&self, account_id: Uuid) -> PortResult<u64> {
        let inner = self.lock()?;
        Ok(inner.usage.iter().filter(|r| r.account_id == account_id).count() as u64)
    }

    async fn append_within_quota(
        &self,
        record: NewUsageRecord,
        quota: u32,
    ) -> PortResult<Option<RecordedAnalysis>> {
        let mut inner = self.lock()?;
        if !inner.accounts.contains_key(&record.account_id) {
            return Err(PortError::NotFound(format!(
                "Account {} not found",
                record.account_id
            )));
        }
        let used = inner
            .usage
            .iter()
            .filter(|r| r.account_id == record.account_id)
            .count() as u64;
        if used >= u64::from(quota) {
            return Ok(None);
        }
        let stored = UsageRecord {
            id: Uuid::new_v4(),
            account_id: record.account_id,
            category: record.category,
            context_text: record.context_text,
            result_text: record.result_text,
            created_at: record.created_at,
        };
        inner.usage.push(stored.clone());
        Ok(Some(RecordedAnalysis {
            record: stored,
            usage: UsageSummary::new(used + 1, quota),
        }))
    }

    async fn list_for_account(&self, account_id: Uuid) -> PortResult<Vec<UsageRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .usage
            .iter()
            .rev()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::AnalysisCategory;

    fn record(account_id: Uuid, n: usize) -> NewUsageRecord {
        NewUsageRecord {
            account_id,
            category: AnalysisCategory::Evaluation,
            context_text: format!("jd {n}"),
            result_text: format!("result {n}"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_identity_conflicts() {
        let store = MemoryStore::new();
        store.create_account("a@x.com", "h", Utc::now()).await.unwrap();
        let err = store.create_account("a@x.com", "h2", Utc::now()).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        // Identity equality is case-sensitive.
        store.create_account("A@x.com", "h", Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn append_stops_at_quota() {
        let store = MemoryStore::new();
        let account = store.create_account("a@x.com", "h", Utc::now()).await.unwrap();
        for n in 0..3 {
            let recorded = store
                .append_within_quota(record(account.id, n), 3)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(recorded.usage, UsageSummary::new(n as u64 + 1, 3));
        }
        assert!(store.append_within_quota(record(account.id, 3), 3).await.unwrap().is_none());
        assert_eq!(store.count_for_account(account.id).await.unwrap(), 3);

        let listed = store.list_for_account(account.id).await.unwrap();
        assert_eq!(listed[0].context_text, "jd 2");
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .create_auth_session("old", id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        store
            .create_auth_session("live", id, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert!(matches!(
            store.validate_auth_session("old").await,
            Err(PortError::Unauthorized)
        ));
        assert_eq!(store.validate_auth_session("live").await.unwrap(), id);

        store.delete_auth_session("live").await.unwrap();
        assert!(store.validate_auth_session("live").await.is_err());
    }
}
