pub mod credentials;
pub mod domain;
pub mod gate;
pub mod memory;
pub mod ports;

pub use domain::{
    Account, AccountCredentials, AnalysisCategory, CheckoutSession, DocumentImage,
    NewUsageRecord, Plan, RecordedAnalysis, SessionContext, UsageRecord, UsageSummary,
};
pub use gate::{AccessGate, AnalysisRequest, GateError, GateResult, DEFAULT_QUOTA};
pub use memory::MemoryStore;
pub use ports::{
    AnalysisEngine, DocumentRenderer, IdentityStore, PaymentGateway, PortError, PortResult,
    SessionStore, UsageLedger,
};
