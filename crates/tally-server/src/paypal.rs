//! PayPal order verification
//!
//! Looks an order up against the PayPal Orders API before it is applied,
//! so the client-reported status and amount are never trusted when
//! credentials are configured. Without credentials the bridge falls back
//! to the order payload as reported.

use anyhow::{anyhow, Context};
use serde::Deserialize;
use tracing::debug;

use tally_core::models::{money, PaymentOrder};

/// Default API base (sandbox); override with `PAYPAL_BASE_URL` for live
const DEFAULT_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct OrderAmount {
    value: String,
}

#[derive(Deserialize)]
struct PurchaseUnit {
    amount: OrderAmount,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    purchase_units: Vec<PurchaseUnit>,
}

impl PayPalClient {
    /// Build a client from `PAYPAL_CLIENT_ID` / `PAYPAL_SECRET`;
    /// None when credentials are absent
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("PAYPAL_CLIENT_ID").ok().filter(|s| !s.is_empty())?;
        let secret = std::env::var("PAYPAL_SECRET").ok().filter(|s| !s.is_empty())?;
        let base_url = std::env::var("PAYPAL_BASE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Some(Self {
            http: reqwest::Client::new(),
            base_url,
            client_id,
            secret,
        })
    }

    /// Fetch an order from PayPal and translate it into a [`PaymentOrder`]
    ///
    /// The returned order carries whatever status PayPal reports; the store
    /// decides whether to accept it.
    pub async fn fetch_order(&self, order_id: &str) -> anyhow::Result<PaymentOrder> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, order_id))
            .bearer_auth(&token)
            .send()
            .await
            .context("PayPal order lookup failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("PayPal order lookup failed: {}", response.status()));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .context("PayPal order response was not valid JSON")?;
        let order: OrderResponse =
            serde_json::from_value(raw.clone()).context("Unexpected PayPal order shape")?;

        let amount = order
            .purchase_units
            .first()
            .ok_or_else(|| anyhow!("PayPal order has no purchase units"))?
            .amount
            .value
            .parse::<f64>()
            .context("PayPal amount was not a number")?;
        let amount_cents = money::to_cents(amount)
            .ok_or_else(|| anyhow!("PayPal amount was not a finite number"))?;

        debug!(order_id = %order.id, status = %order.status, "Fetched PayPal order");

        Ok(PaymentOrder {
            external_id: order.id,
            status: order.status,
            amount_cents,
            method: "paypal".to_string(),
            metadata: raw,
        })
    }

    /// Client-credentials OAuth token
    async fn access_token(&self) -> anyhow::Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("PayPal token request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("PayPal token request failed: {}", response.status()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("PayPal token response was not valid JSON")?;
        Ok(token.access_token)
    }
}
