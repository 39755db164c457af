//! crates/ats_gate_core/src/gate.rs
//!
//! The access gate: registration, authentication and the quota check that
//! decides whether an analysis request may reach the analysis engine.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::credentials;
use crate::domain::{
    Account, AnalysisCategory, DocumentImage, NewUsageRecord, RecordedAnalysis, SessionContext,
    UsageRecord, UsageSummary,
};
use crate::ports::{
    AnalysisEngine, DocumentRenderer, IdentityStore, PortError, UsageLedger,
};

/// Free analyses per account before an upgrade is required.
pub const DEFAULT_QUOTA: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("An account with this identity already exists")]
    DuplicateIdentity,
    #[error("Analysis quota exceeded ({used} of {quota} used)")]
    QuotaExceeded { used: u64, quota: u32 },
    #[error("No document was provided")]
    NoDocumentProvided,
    #[error("Document conversion failed: {0}")]
    ConversionFailure(String),
    #[error("Analysis engine failed: {0}")]
    EngineFailure(String),
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PortError),
    #[error("Credential hashing failed: {0}")]
    Credential(String),
}

pub type GateResult<T> = Result<T, GateError>;

/// Everything `authorize_and_run` needs besides the caller.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub category: AnalysisCategory,
    pub context_text: String,
    pub document_image: DocumentImage,
    pub instruction: String,
}

#[derive(Clone)]
pub struct AccessGate {
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn UsageLedger>,
    engine: Arc<dyn AnalysisEngine>,
    renderer: Arc<dyn DocumentRenderer>,
    quota: u32,
}

impl AccessGate {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn UsageLedger>,
        engine: Arc<dyn AnalysisEngine>,
        renderer: Arc<dyn DocumentRenderer>,
        quota: u32,
    ) -> Self {
        Self {
            identities,
            ledger,
            engine,
            renderer,
            quota,
        }
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub async fn register(&self, identity: &str, secret: &str) -> GateResult<Account> {
        if self.identities.find_credentials(identity).await?.is_some() {
            info!(%identity, "Registration rejected: identity exists.");
            return Err(GateError::DuplicateIdentity);
        }
        let secret_hash =
            credentials::hash_secret(secret).map_err(|e| GateError::Credential(e.to_string()))?;
        let account = self
            .identities
            .create_account(identity, &secret_hash, Utc::now())
            .await
            .map_err(|e| match e {
                // Lost a race against a concurrent registration.
                PortError::Conflict(_) => GateError::DuplicateIdentity,
                other => GateError::Persistence(other),
            })?;
        info!(account_id = %account.id, "Account registered.");
        Ok(account)
    }

    /// `Ok(None)` means invalid credentials; that is a normal outcome, not an error.
    pub async fn authenticate(&self, identity: &str, secret: &str) -> GateResult<Option<Account>> {
        let Some(creds) = self.identities.find_credentials(identity).await? else {
            info!(%identity, "Login failed: unknown identity.");
            return Ok(None);
        };
        let valid = credentials::verify_secret(secret, &creds.secret_hash)
            .map_err(|e| GateError::Credential(e.to_string()))?;
        if !valid {
            info!(account_id = %creds.account.id, "Login failed: wrong secret.");
            return Ok(None);
        }
        let now = Utc::now();
        self.identities.touch_last_login(creds.account.id, now).await?;
        info!(account_id = %creds.account.id, "Login succeeded.");
        Ok(Some(Account {
            last_login_at: now,
            ..creds.account
        }))
    }

    pub async fn usage(&self, account_id: Uuid) -> GateResult<UsageSummary> {
        let used = self.ledger.count_for_account(account_id).await?;
        Ok(UsageSummary::new(used, self.quota))
    }

    pub async fn history(&self, session: &SessionContext) -> GateResult<Vec<UsageRecord>> {
        Ok(self.ledger.list_for_account(session.account.id).await?)
    }

    async fn ensure_under_quota(&self, account_id: Uuid) -> GateResult<()> {
        let used = self.ledger.count_for_account(account_id).await?;
        if used >= u64::from(self.quota) {
            warn!(%account_id, used, quota = self.quota, "Quota exceeded.");
            return Err(GateError::QuotaExceeded {
                used,
                quota: self.quota,
            });
        }
        Ok(())
    }

    /// Checks the quota, runs the engine and records the result.
    ///
    /// The record is appended with an atomic compare-and-append, so the quota
    /// is never exceeded; a request that loses that race gets `QuotaExceeded`
    /// and its result is dropped. Nothing is recorded when the engine fails.
    /// The returned usage comes from the append itself, so a stored result is
    /// never lost to a later read.
    pub async fn authorize_and_run(
        &self,
        session: &SessionContext,
        request: AnalysisRequest,
    ) -> GateResult<RecordedAnalysis> {
        let account_id = session.account.id;
        self.ensure_under_quota(account_id).await?;

        let result_text = self
            .engine
            .generate(
                &request.instruction,
                &request.document_image,
                &request.context_text,
            )
            .await
            .map_err(|e| {
                warn!(%account_id, error = %e, "Analysis engine call failed.");
                GateError::EngineFailure(e.to_string())
            })?;

        let record = NewUsageRecord {
            account_id,
            category: request.category,
            context_text: request.context_text,
            result_text,
            created_at: Utc::now(),
        };
        match self.ledger.append_within_quota(record, self.quota).await? {
            Some(recorded) => {
                info!(
                    %account_id,
                    record_id = %recorded.record.id,
                    category = %recorded.record.category,
                    used = recorded.usage.used,
                    "Analysis recorded."
                );
                Ok(recorded)
            }
            None => {
                let used = self.ledger.count_for_account(account_id).await?;
                warn!(%account_id, used, "Quota filled by a concurrent request; result dropped.");
                Err(GateError::QuotaExceeded {
                    used,
                    quota: self.quota,
                })
            }
        }
    }

    /// The whole request flow: quota check, PDF conversion, then `authorize_and_run`.
    pub async fn run_analysis(
        &self,
        session: &SessionContext,
        category: AnalysisCategory,
        context_text: &str,
        pdf: Option<&[u8]>,
        instruction: &str,
    ) -> GateResult<RecordedAnalysis> {
        self.ensure_under_quota(session.account.id).await?;

        let pdf = match pdf {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(GateError::NoDocumentProvided),
        };
        let document_image = self
            .renderer
            .render_first_page(pdf)
            .await
            .map_err(|e| GateError::ConversionFailure(e.to_string()))?;

        self.authorize_and_run(
            session,
            AnalysisRequest {
                category,
                context_text: context_text.to_string(),
                document_image,
                instruction: instruction.to_string(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::ports::PortResult;

    struct FakeEngine {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisEngine for FakeEngine {
        async fn generate(
            &self,
            instruction: &str,
            image: &DocumentImage,
            context_text: &str,
        ) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Unexpected("provider unavailable".to_string()));
            }
            Ok(format!("{instruction}|{}|{context_text}", image.mime_type))
        }
    }

    const PDF: &[u8] = b"%PDF-1.7";

    struct FakeRenderer;

    #[async_trait]
    impl DocumentRenderer for FakeRenderer {
        async fn render_first_page(&self, pdf: &[u8]) -> PortResult<DocumentImage> {
            if !pdf.starts_with(b"%PDF") {
                return Err(PortError::Unexpected("not a pdf".to_string()));
            }
            Ok(DocumentImage {
                mime_type: "image/jpeg".to_string(),
                bytes: vec![0xff, 0xd8],
            })
        }
    }

    fn gate_with(engine: FakeEngine) -> (AccessGate, Arc<MemoryStore>, Arc<FakeEngine>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(engine);
        let gate = AccessGate::new(
            store.clone(),
            store.clone(),
            engine.clone(),
            Arc::new(FakeRenderer),
            DEFAULT_QUOTA,
        );
        (gate, store, engine)
    }

    fn working_engine() -> FakeEngine {
        FakeEngine {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn request(category: AnalysisCategory, context: &str) -> AnalysisRequest {
        AnalysisRequest {
            category,
            context_text: context.to_string(),
            document_image: DocumentImage {
                mime_type: "image/jpeg".to_string(),
                bytes: vec![1, 2, 3],
            },
            instruction: "evaluate".to_string(),
        }
    }

    async fn session_for(gate: &AccessGate, identity: &str) -> SessionContext {
        gate.register(identity, "pw").await.unwrap();
        let account = gate.authenticate(identity, "pw").await.unwrap().unwrap();
        SessionContext::new("s1", account)
    }

    async fn seed_records(store: &MemoryStore, account_id: Uuid, n: usize) {
        for i in 0..n {
            let record = NewUsageRecord {
                account_id,
                category: AnalysisCategory::Evaluation,
                context_text: format!("seed {i}"),
                result_text: "ok".to_string(),
                created_at: Utc::now(),
            };
            store.append_within_quota(record, u32::MAX).await.unwrap();
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (gate, _, _) = gate_with(working_engine());
        let account = gate.register("a@x.com", "pw1").await.unwrap();
        let found = gate.authenticate("a@x.com", "pw1").await.unwrap().unwrap();
        assert_eq!(found.id, account.id);
        assert_eq!(found.identity, "a@x.com");
    }

    #[tokio::test]
    async fn wrong_secret_leaves_last_login_alone() {
        let (gate, store, _) = gate_with(working_engine());
        let account = gate.register("a@x.com", "pw1").await.unwrap();

        assert!(gate.authenticate("a@x.com", "wrong").await.unwrap().is_none());
        assert!(gate.authenticate("nobody@x.com", "pw1").await.unwrap().is_none());

        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.last_login_at, account.last_login_at);
    }

    #[tokio::test]
    async fn successful_login_updates_last_login() {
        let (gate, store, _) = gate_with(working_engine());
        let account = gate.register("a@x.com", "pw1").await.unwrap();
        let found = gate.authenticate("a@x.com", "pw1").await.unwrap().unwrap();
        assert!(found.last_login_at >= account.last_login_at);
        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.last_login_at, found.last_login_at);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (gate, store, _) = gate_with(working_engine());
        gate.register("a@x.com", "pw1").await.unwrap();
        let err = gate.register("a@x.com", "pw2").await.unwrap_err();
        assert!(matches!(err, GateError::DuplicateIdentity));

        assert_eq!(store.account_count(), (1, 1));
        // The original secret still works, so the first account was kept.
        assert!(gate.authenticate("a@x.com", "pw1").await.unwrap().is_some());
        assert!(gate.authenticate("a@x.com", "pw2").await.unwrap().is_none());
        assert!(store.find_credentials("a@x.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn full_quota_is_denied_without_recording() {
        let (gate, store, engine) = gate_with(working_engine());
        let session = session_for(&gate, "a@x.com").await;
        seed_records(&store, session.account.id, 5).await;

        let err = gate
            .authorize_and_run(&session, request(AnalysisCategory::Evaluation, "jd"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::QuotaExceeded { used: 5, quota: 5 }));
        assert_eq!(store.count_for_account(session.account.id).await.unwrap(), 5);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fifth_analysis_is_recorded() {
        let (gate, store, _) = gate_with(working_engine());
        let session = session_for(&gate, "a@x.com").await;
        seed_records(&store, session.account.id, 4).await;

        let recorded = gate
            .authorize_and_run(&session, request(AnalysisCategory::MatchPercentage, "rust jd"))
            .await
            .unwrap();
        assert_eq!(recorded.record.category, AnalysisCategory::MatchPercentage);
        assert_eq!(recorded.record.result_text, "evaluate|image/jpeg|rust jd");
        assert_eq!(recorded.usage, UsageSummary::new(5, 5));

        let records = store.list_for_account(session.account.id).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0], recorded.record);
    }

    #[tokio::test]
    async fn engine_failure_records_nothing() {
        let (gate, store, _) = gate_with(FakeEngine {
            fail: true,
            calls: AtomicUsize::new(0),
        });
        let session = session_for(&gate, "a@x.com").await;
        seed_records(&store, session.account.id, 2).await;

        let err = gate
            .authorize_and_run(&session, request(AnalysisCategory::Evaluation, "jd"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::EngineFailure(_)));
        assert_eq!(store.count_for_account(session.account.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sixth_call_after_five_successes_is_denied() {
        let (gate, _, _) = gate_with(working_engine());
        gate.register("a@x.com", "pw1").await.unwrap();
        assert!(gate.authenticate("a@x.com", "pw1").await.unwrap().is_some());
        assert!(gate.authenticate("a@x.com", "wrong").await.unwrap().is_none());
        let account = gate.authenticate("a@x.com", "pw1").await.unwrap().unwrap();
        let session = SessionContext::new("s", account);

        for _ in 0..5 {
            gate.run_analysis(
                &session,
                AnalysisCategory::Evaluation,
                "jd",
                Some(PDF),
                "evaluate",
            )
            .await
            .unwrap();
        }
        let err = gate
            .run_analysis(
                &session,
                AnalysisCategory::Evaluation,
                "jd",
                Some(PDF),
                "evaluate",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::QuotaExceeded { .. }));

        let usage = gate.usage(session.account.id).await.unwrap();
        assert_eq!(usage, UsageSummary::new(5, 5));
    }

    #[tokio::test]
    async fn missing_or_broken_document_is_reported() {
        let (gate, store, engine) = gate_with(working_engine());
        let session = session_for(&gate, "a@x.com").await;

        let err = gate
            .run_analysis(&session, AnalysisCategory::Evaluation, "jd", None, "i")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NoDocumentProvided));

        let err = gate
            .run_analysis(&session, AnalysisCategory::Evaluation, "jd", Some(&[][..]), "i")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NoDocumentProvided));

        let err = gate
            .run_analysis(&session, AnalysisCategory::Evaluation, "jd", Some(&b"hello"[..]), "i")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::ConversionFailure(_)));

        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count_for_account(session.account.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_never_pass_the_quota() {
        let (gate, store, _) = gate_with(working_engine());
        let session = session_for(&gate, "a@x.com").await;
        seed_records(&store, session.account.id, 3).await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                gate.authorize_and_run(&session, request(AnalysisCategory::Evaluation, "jd"))
                    .await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(GateError::QuotaExceeded { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(store.count_for_account(session.account.id).await.unwrap(), 5);
    }
}
