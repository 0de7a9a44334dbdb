//! Checkout initiation and the processor's return pages

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::common::{success_response, RequestOrigin};
use crate::models::{AppliedDiscount, CheckoutOrder, OrderLine};
use crate::services::CallbackUrls;
use crate::session::SessionCookie;
use crate::{ApiResponse, AppState};

/// Named payment routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRoute {
    Process,
    Completed,
    Canceled,
}

impl PaymentRoute {
    pub const fn name(self) -> &'static str {
        match self {
            PaymentRoute::Process => "payment:process",
            PaymentRoute::Completed => "payment:completed",
            PaymentRoute::Canceled => "payment:canceled",
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            PaymentRoute::Process => "/payment/process",
            PaymentRoute::Completed => "/payment/completed",
            PaymentRoute::Canceled => "/payment/canceled",
        }
    }

    /// Resolve this route against the request origin.
    pub fn url(self, origin: &RequestOrigin) -> String {
        origin.absolute(self.path())
    }
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            PaymentRoute::Process.path(),
            get(checkout_summary).post(process_payment),
        )
        .route(PaymentRoute::Completed.path(), get(payment_completed))
        .route(PaymentRoute::Canceled.path(), get(payment_canceled))
}

/// Form the presentation layer renders to start payment
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitControl {
    #[schema(example = "POST")]
    pub method: String,
    #[schema(example = "/payment/process")]
    pub action: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSummary {
    pub order_id: Uuid,
    pub paid: bool,
    pub lines: Vec<OrderLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<AppliedDiscount>,
    #[schema(value_type = String, example = "39.98")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "4.00")]
    pub discount_amount: Decimal,
    #[schema(value_type = String, example = "35.98")]
    pub total: Decimal,
    #[schema(example = "usd")]
    pub currency: String,
    pub submit: SubmitControl,
}

impl CheckoutSummary {
    pub fn new(order: CheckoutOrder, currency: &str) -> Self {
        let subtotal = order.total_cost_before_discount();
        let discount_amount = order.discount_amount();
        let total = order.total_cost();
        Self {
            order_id: order.id,
            paid: order.paid,
            lines: order.items,
            discount: order.discount,
            subtotal,
            discount_amount,
            total,
            currency: currency.to_string(),
            submit: SubmitControl {
                method: "POST".to_string(),
                action: PaymentRoute::Process.path().to_string(),
            },
        }
    }
}

/// Static view shown when the shopper returns from the processor
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentOutcome {
    #[schema(example = "completed")]
    pub status: String,
    pub message: String,
}

/// Show the order awaiting payment
#[utoipa::path(
    get,
    path = "/payment/process",
    summary = "Checkout summary",
    description = "Show the order referenced by the session together with the control that starts payment",
    responses(
        (status = 200, description = "Order ready for payment", body = ApiResponse<CheckoutSummary>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "No order in session", body = crate::errors::ErrorResponse),
    ),
    tag = "payment"
)]
#[instrument(skip(state, session))]
pub async fn checkout_summary(
    State(state): State<AppState>,
    session: SessionCookie,
) -> Result<Response, ServiceError> {
    let order_id = session.order_id(state.sessions.as_ref()).await?;
    let order = state.checkout.load_order(order_id).await?;
    let summary = CheckoutSummary::new(order, state.checkout.currency());
    Ok(success_response(ApiResponse::success(summary)))
}

/// Create a hosted checkout session and send the shopper to it
#[utoipa::path(
    post,
    path = "/payment/process",
    summary = "Start payment",
    description = "Create the processor checkout session for the session's order and redirect to the hosted payment page",
    responses(
        (status = 303, description = "Redirect to the hosted payment page",
            headers(("Location" = String, description = "Hosted checkout URL"))
        ),
        (status = 400, description = "Order cannot be paid", body = crate::errors::ErrorResponse),
        (status = 404, description = "No order in session", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment service unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "payment"
)]
#[instrument(skip(state, session, origin))]
pub async fn process_payment(
    State(state): State<AppState>,
    session: SessionCookie,
    origin: RequestOrigin,
) -> Result<Redirect, ServiceError> {
    let order_id = session.order_id(state.sessions.as_ref()).await?;
    let urls = CallbackUrls {
        success_url: PaymentRoute::Completed.url(&origin),
        cancel_url: PaymentRoute::Canceled.url(&origin),
    };

    let hosted_url = state.checkout.start_checkout(order_id, &urls).await?;
    info!(%order_id, "redirecting to hosted checkout");
    Ok(Redirect::to(&hosted_url))
}

#[utoipa::path(
    get,
    path = "/payment/completed",
    summary = "Payment completed",
    responses((status = 200, description = "Payment completed view", body = ApiResponse<PaymentOutcome>)),
    tag = "payment"
)]
pub async fn payment_completed() -> impl IntoResponse {
    success_response(ApiResponse::success(PaymentOutcome {
        status: "completed".to_string(),
        message: "Your payment was successful.".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/payment/canceled",
    summary = "Payment canceled",
    responses((status = 200, description = "Payment canceled view", body = ApiResponse<PaymentOutcome>)),
    tag = "payment"
)]
pub async fn payment_canceled() -> impl IntoResponse {
    success_response(ApiResponse::success(PaymentOutcome {
        status: "canceled".to_string(),
        message: "Your payment has not been processed.".to_string(),
    }))
}
