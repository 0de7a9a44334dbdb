use async_trait::async_trait;
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{info, instrument, warn};

use crate::config::StripeConfig;
use crate::errors::ServiceError;
use crate::services::payment_gateway::{
    CheckoutSessionParams, CouponParams, HostedCheckout, PaymentGateway, RemoteCoupon,
};

const STRIPE_VERSION_HEADER: &str = "Stripe-Version";

/// Stripe REST client for coupons and checkout sessions
#[derive(Clone)]
pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client error: {}", e)))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .basic_auth(&self.config.secret_key, Some(""))
            .header(STRIPE_VERSION_HEADER, &self.config.api_version)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                counter!("shop_checkout.gateway_failures", 1);
                warn!("Stripe request to {} failed: {}", path, e);
                ServiceError::PaymentUnavailable(format!("Stripe request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            counter!("shop_checkout.gateway_failures", 1);
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|envelope| envelope.error.to_string())
                .unwrap_or(body);
            warn!(%status, "Stripe API error on {}: {}", path, detail);
            return Err(ServiceError::PaymentUnavailable(format!(
                "Stripe returned {}: {}",
                status, detail
            )));
        }

        response.json::<T>().await.map_err(|e| {
            counter!("shop_checkout.gateway_failures", 1);
            ServiceError::PaymentUnavailable(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, params), fields(coupon = %params.name))]
    async fn create_coupon(&self, params: &CouponParams) -> Result<RemoteCoupon, ServiceError> {
        let coupon: RemoteCoupon = self.post_form("coupons", &params.to_form()).await?;
        info!("Stripe coupon created: {}", coupon.id);
        Ok(coupon)
    }

    #[instrument(skip(self, params), fields(client_reference_id = %params.client_reference_id))]
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<HostedCheckout, ServiceError> {
        let session: HostedCheckout = self
            .post_form("checkout/sessions", &params.to_form())
            .await?;
        info!("Stripe checkout session created: {}", session.id);
        Ok(session)
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl std::fmt::Display for StripeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.message.as_deref().unwrap_or("unknown error"),
            self.code
                .as_deref()
                .or(self.kind.as_deref())
                .unwrap_or("unclassified")
        )
    }
}
