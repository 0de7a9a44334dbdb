use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::health::{ComponentHealth, ComponentStatus, HealthResponse};
use crate::handlers::payment::{CheckoutSummary, PaymentOutcome, SubmitControl};
use crate::models::{AppliedDiscount, OrderLine};
use crate::ResponseMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shop Checkout API",
        version = "1.0.0",
        description = r#"
# Shop Checkout

Starts hosted Stripe checkout for the order held in the visitor's session.

- `GET /payment/process` returns the order summary and the control that starts payment.
- `POST /payment/process` creates the checkout session and answers `303 See Other`
  with the hosted payment page in `Location`.
- `/payment/completed` and `/payment/canceled` are the processor's return pages.

Errors use a common body:

```json
{
  "error": "Not Found",
  "message": "Not found: Order not found",
  "request_id": "2f6b...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
"#
    ),
    paths(
        crate::handlers::payment::checkout_summary,
        crate::handlers::payment::process_payment,
        crate::handlers::payment::payment_completed,
        crate::handlers::payment::payment_canceled,
        crate::handlers::health::health_check,
    ),
    components(schemas(
        CheckoutSummary,
        SubmitControl,
        PaymentOutcome,
        OrderLine,
        AppliedDiscount,
        HealthResponse,
        ComponentHealth,
        ComponentStatus,
        ErrorResponse,
        ResponseMeta,
    )),
    tags(
        (name = "payment", description = "Hosted checkout"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
