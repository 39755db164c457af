//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use ats_gate_core::{
    gate::AccessGate,
    ports::{IdentityStore, PaymentGateway, SessionStore},
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: AccessGate,
    pub identities: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// `None` when no payment provider is configured; checkout is then unavailable.
    pub payments: Option<Arc<dyn PaymentGateway>>,
}
