//! Outbound requests to the hosted-checkout processor
//!
//! The types mirror the two Stripe resources checkout needs. They are plain
//! data; [`PaymentGateway`] implementations decide how to put them on the wire.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// One-time payment
    Payment,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDuration {
    Once,
}

impl CouponDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponDuration::Once => "once",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductData {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceData {
    /// Amount in the currency's minor unit
    pub unit_amount: i64,
    pub currency: String,
    pub product_data: ProductData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub price_data: PriceData,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiscountRef {
    pub coupon: String,
}

/// Parameters of a checkout-session creation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionParams {
    pub mode: CheckoutMode,
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub line_items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discounts: Vec<DiscountRef>,
}

impl CheckoutSessionParams {
    /// Flatten into Stripe's bracketed form encoding.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), self.mode.as_str().to_string()),
            (
                "client_reference_id".to_string(),
                self.client_reference_id.clone(),
            ),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        for (i, item) in self.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            form.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.price_data.unit_amount.to_string(),
            ));
            form.push((
                format!("{}[price_data][currency]", prefix),
                item.price_data.currency.clone(),
            ));
            form.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.price_data.product_data.name.clone(),
            ));
            form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        for (i, discount) in self.discounts.iter().enumerate() {
            form.push((format!("discounts[{}][coupon]", i), discount.coupon.clone()));
        }

        form
    }
}

/// Parameters of a coupon creation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CouponParams {
    pub name: String,
    pub percent_off: Decimal,
    pub duration: CouponDuration,
}

impl CouponParams {
    pub fn to_form(&self) -> Vec<(String, String)> {
        vec![
            ("name".to_string(), self.name.clone()),
            ("percent_off".to_string(), self.percent_off.normalize().to_string()),
            ("duration".to_string(), self.duration.as_str().to_string()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCoupon {
    pub id: String,
}

/// Checkout session as returned by the processor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedCheckout {
    pub id: String,
    /// Hosted payment page; absent once the session is complete or expired
    pub url: Option<String>,
}

/// Seam between checkout and the payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_coupon(&self, params: &CouponParams) -> Result<RemoteCoupon, ServiceError>;

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<HostedCheckout, ServiceError>;
}
