//! services/api/src/adapters/payments.rs
//!
//! Starts Stripe Checkout sessions for the paid plans. It implements the
//! `PaymentGateway` port; nothing flows back from the provider, so a
//! completed payment does not change an account's quota.

use async_trait::async_trait;
use ats_gate_core::{
    domain::{Account, CheckoutSession, Plan},
    ports::{PaymentGateway, PortError, PortResult},
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::PaymentConfig;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone)]
pub struct StripeCheckoutAdapter {
    client: reqwest::Client,
    api_base: String,
    config: PaymentConfig,
}

#[derive(Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeCheckoutAdapter {
    pub fn new(client: reqwest::Client, config: PaymentConfig) -> Self {
        Self::with_api_base(client, config, STRIPE_API_BASE.to_string())
    }

    pub fn with_api_base(client: reqwest::Client, config: PaymentConfig, api_base: String) -> Self {
        Self {
            client,
            api_base,
            config,
        }
    }

    /// The form body of a one-off payment for `plan`, in Stripe's bracketed key notation.
    fn checkout_form(&self, plan: Plan, account: &Account) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price_data][currency]", Plan::CURRENCY.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                plan.display_name().to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                plan.amount_cents().to_string(),
            ),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("client_reference_id", account.id.to_string()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutAdapter {
    async fn start_checkout(&self, plan: Plan, account: &Account) -> PortResult<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.config.stripe_secret_key)
            .form(&self.checkout_form(plan, account))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("payment provider unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            warn!(%status, %message, plan = plan.slug(), "Checkout session rejected.");
            return Err(PortError::Unexpected(format!("payment provider error: {}", message)));
        }

        let session: StripeSession = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid payment provider response: {}", e)))?;
        let redirect_url = session.url.ok_or_else(|| {
            PortError::Unexpected("payment provider returned no checkout URL".to_string())
        })?;
        info!(account_id = %account.id, plan = plan.slug(), session_id = %session.id, "Checkout started.");
        Ok(CheckoutSession {
            id: session.id,
            redirect_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn form_carries_plan_price_and_account() {
        let adapter = StripeCheckoutAdapter::new(
            reqwest::Client::new(),
            PaymentConfig {
                stripe_secret_key: "sk_test".to_string(),
                success_url: "https://example.com/ok".to_string(),
                cancel_url: "https://example.com/no".to_string(),
            },
        );
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            identity: "a@x.com".to_string(),
            created_at: now,
            last_login_at: now,
        };
        let form = adapter.checkout_form(Plan::AdvancedAnalysis, &account);
        let get = |key: &str| form.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("10000"));
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            Some("Advanced Analysis")
        );
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("success_url"), Some("https://example.com/ok"));
        assert_eq!(get("client_reference_id"), Some(account.id.to_string().as_str()));
    }
}
