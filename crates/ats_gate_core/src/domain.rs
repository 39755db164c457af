//! crates/ats_gate_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A registered identity. Used throughout the app; never carries the secret hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

// Only used internally for authentication - contains sensitive data
#[derive(Clone)]
pub struct AccountCredentials {
    pub account: Account,
    pub secret_hash: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account", &self.account)
            .field("secret_hash", &"<XXXXX>")
            .finish()
    }
}

/// The authenticated caller of a single request.
///
/// Built by the web layer once the session cookie has been validated and
/// handed explicitly to every gate operation that needs a logged-in account.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub account: Account,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, account: Account) -> Self {
        Self {
            session_id: session_id.into(),
            account,
        }
    }
}

/// The fixed set of analyses a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisCategory {
    Evaluation,
    ImprovementTips,
    MatchPercentage,
}

impl AnalysisCategory {
    pub const ALL: [AnalysisCategory; 3] = [
        AnalysisCategory::Evaluation,
        AnalysisCategory::ImprovementTips,
        AnalysisCategory::MatchPercentage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisCategory::Evaluation => "evaluation",
            AnalysisCategory::ImprovementTips => "improvement-tips",
            AnalysisCategory::MatchPercentage => "match-percentage",
        }
    }
}

impl fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown analysis category: '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for AnalysisCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// A usage record that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub account_id: Uuid,
    pub category: AnalysisCategory,
    pub context_text: String,
    pub result_text: String,
    pub created_at: DateTime<Utc>,
}

/// One completed analysis. Append-only; the count per account is the usage counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub category: AnalysisCategory,
    pub context_text: String,
    pub result_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSummary {
    pub used: u64,
    pub quota: u32,
    pub remaining: u64,
}

impl UsageSummary {
    pub fn new(used: u64, quota: u32) -> Self {
        Self {
            used,
            quota,
            remaining: u64::from(quota).saturating_sub(used),
        }
    }
}

/// A stored analysis and the account's usage right after it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAnalysis {
    pub record: UsageRecord,
    pub usage: UsageSummary,
}

/// The first page of an uploaded document, ready for the analysis engine.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Paid plans offered once the free quota is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    BasicEvaluation,
    AdvancedAnalysis,
    FullAtsOptimization,
}

impl Plan {
    pub const ALL: [Plan; 3] = [
        Plan::BasicEvaluation,
        Plan::AdvancedAnalysis,
        Plan::FullAtsOptimization,
    ];

    pub const CURRENCY: &'static str = "usd";

    pub fn slug(self) -> &'static str {
        match self {
            Plan::BasicEvaluation => "basic-evaluation",
            Plan::AdvancedAnalysis => "advanced-analysis",
            Plan::FullAtsOptimization => "full-ats-optimization",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Plan::BasicEvaluation => "Basic Evaluation",
            Plan::AdvancedAnalysis => "Advanced Analysis",
            Plan::FullAtsOptimization => "Full ATS Optimization",
        }
    }

    /// Price in the smallest currency unit (cents).
    pub fn amount_cents(self) -> u64 {
        match self {
            Plan::BasicEvaluation => 5_000,
            Plan::AdvancedAnalysis => 10_000,
            Plan::FullAtsOptimization => 15_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plan: '{0}'")]
pub struct UnknownPlan(pub String);

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|p| p.slug() == s)
            .ok_or_else(|| UnknownPlan(s.to_string()))
    }
}

/// A checkout started with the payment provider.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub redirect_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_parse_from_wire_names() {
        assert_eq!(
            "improvement-tips".parse::<AnalysisCategory>(),
            Ok(AnalysisCategory::ImprovementTips)
        );
        assert_eq!(
            "match-percentage".parse::<AnalysisCategory>(),
            Ok(AnalysisCategory::MatchPercentage)
        );
        assert!("Evaluation".parse::<AnalysisCategory>().is_err());
    }

    #[test]
    fn plans_keep_their_prices() {
        assert_eq!("basic-evaluation".parse::<Plan>(), Ok(Plan::BasicEvaluation));
        assert_eq!(Plan::AdvancedAnalysis.amount_cents(), 10_000);
        assert_eq!(Plan::FullAtsOptimization.display_name(), "Full ATS Optimization");
        assert!("gold".parse::<Plan>().is_err());
    }

    #[test]
    fn usage_summary_never_goes_negative() {
        let summary = UsageSummary::new(7, 5);
        assert_eq!(summary.remaining, 0);
        assert_eq!(UsageSummary::new(2, 5).remaining, 3);
    }

    #[test]
    fn credentials_debug_hides_hash() {
        let now = Utc::now();
        let creds = AccountCredentials {
            account: Account {
                id: Uuid::new_v4(),
                identity: "a@x.com".to_string(),
                created_at: now,
                last_login_at: now,
            },
            secret_hash: "$argon2id$secret".to_string(),
        };
        assert!(!format!("{creds:?}").contains("argon2id"));
    }
}
