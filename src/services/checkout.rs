use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::CheckoutOrder;
use crate::repositories::OrderRepository;
use crate::services::payment_gateway::{
    CheckoutMode, CheckoutSessionParams, CouponDuration, CouponParams, DiscountRef, LineItem,
    PaymentGateway, PriceData, ProductData,
};

/// Absolute URLs the processor sends the shopper back to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// Turns a pending order into a hosted checkout session
#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderRepository,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        orders: OrderRepository,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            gateway,
            currency: currency.into().to_lowercase(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    #[instrument(skip(self))]
    pub async fn load_order(&self, order_id: Uuid) -> Result<CheckoutOrder, ServiceError> {
        self.orders
            .find_checkout_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))
    }

    /// Session request for `order` without any discount reference attached.
    pub fn build_checkout_request(
        &self,
        order: &CheckoutOrder,
        urls: &CallbackUrls,
    ) -> Result<CheckoutSessionParams, ServiceError> {
        let line_items = order
            .items
            .iter()
            .map(|line| {
                if line.quantity <= 0 {
                    return Err(ServiceError::ValidationError(format!(
                        "Invalid quantity {} for {}",
                        line.quantity, line.product_name
                    )));
                }
                Ok(LineItem {
                    price_data: PriceData {
                        unit_amount: to_minor_units(line.price)?,
                        currency: self.currency.clone(),
                        product_data: ProductData {
                            name: line.product_name.clone(),
                        },
                    },
                    quantity: i64::from(line.quantity),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CheckoutSessionParams {
            mode: CheckoutMode::Payment,
            client_reference_id: order.id.to_string(),
            success_url: urls.success_url.clone(),
            cancel_url: urls.cancel_url.clone(),
            line_items,
            discounts: Vec::new(),
        })
    }

    /// Create the processor-side objects for `order` and return the hosted
    /// payment page URL.
    ///
    /// When the order carries a discount a coupon is created first. If the
    /// session call then fails the coupon stays on the processor side.
    #[instrument(skip(self, order, urls), fields(order_id = %order.id))]
    pub async fn initiate(
        &self,
        order: &CheckoutOrder,
        urls: &CallbackUrls,
    ) -> Result<String, ServiceError> {
        if order.items.is_empty() {
            return Err(ServiceError::BadRequest(
                "Order has no items to pay for".to_string(),
            ));
        }

        let mut request = self.build_checkout_request(order, urls)?;

        if let Some(discount) = &order.discount {
            let coupon = self
                .gateway
                .create_coupon(&CouponParams {
                    name: discount.code.clone(),
                    percent_off: discount.percent_off,
                    duration: CouponDuration::Once,
                })
                .await?;
            counter!("shop_checkout.coupons_created", 1);
            request.discounts.push(DiscountRef { coupon: coupon.id });
        }

        let session = self.gateway.create_checkout_session(&request).await?;
        let Some(url) = session.url else {
            counter!("shop_checkout.gateway_failures", 1);
            warn!(session_id = %session.id, "checkout session has no hosted url");
            return Err(ServiceError::PaymentUnavailable(format!(
                "Checkout session {} returned without a url",
                session.id
            )));
        };

        counter!("shop_checkout.sessions_created", 1);
        info!(session_id = %session.id, "checkout session created");
        Ok(url)
    }

    /// Re-fetch the order and start its checkout.
    pub async fn start_checkout(
        &self,
        order_id: Uuid,
        urls: &CallbackUrls,
    ) -> Result<String, ServiceError> {
        let order = self.load_order(order_id).await?;
        self.initiate(&order, urls).await
    }
}

/// Convert a currency amount to integer minor units (cents).
///
/// Sub-cent values round half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Negative amount {}",
            amount
        )));
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount {} out of range", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppliedDiscount, OrderLine};
    use crate::services::payment_gateway::{HostedCheckout, RemoteCoupon};
    use async_trait::async_trait;
    use mockall::{mock, Sequence};
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use sea_orm::DatabaseConnection;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn create_coupon(&self, params: &CouponParams) -> Result<RemoteCoupon, ServiceError>;
            async fn create_checkout_session(
                &self,
                params: &CheckoutSessionParams,
            ) -> Result<HostedCheckout, ServiceError>;
        }
    }

    fn service(gateway: MockGateway) -> CheckoutService {
        let orders = OrderRepository::new(Arc::new(DatabaseConnection::Disconnected));
        CheckoutService::new(orders, Arc::new(gateway), "USD")
    }

    fn urls() -> CallbackUrls {
        CallbackUrls {
            success_url: "http://shop.test/payment/completed".into(),
            cancel_url: "http://shop.test/payment/canceled".into(),
        }
    }

    fn order(items: Vec<(Decimal, i32)>, discount: Option<AppliedDiscount>) -> CheckoutOrder {
        CheckoutOrder {
            id: Uuid::new_v4(),
            items: items
                .into_iter()
                .enumerate()
                .map(|(i, (price, quantity))| OrderLine {
                    product_id: Uuid::new_v4(),
                    product_name: format!("Tea {}", i),
                    price,
                    quantity,
                })
                .collect(),
            discount,
            paid: false,
        }
    }

    fn hosted(url: Option<&str>) -> HostedCheckout {
        HostedCheckout {
            id: "cs_test_1".into(),
            url: url.map(str::to_string),
        }
    }

    #[rstest]
    #[case(dec!(0), 0)]
    #[case(dec!(19.99), 1999)]
    #[case(dec!(10.5), 1050)]
    #[case(dec!(0.005), 1)]
    #[case(dec!(0.004), 0)]
    #[case(dec!(1.125), 113)]
    fn minor_units(#[case] amount: Decimal, #[case] expected: i64) {
        assert_eq!(to_minor_units(amount).unwrap(), expected);
    }

    #[test]
    fn minor_units_rejects_negative_and_overflow() {
        assert!(matches!(
            to_minor_units(dec!(-0.01)),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            to_minor_units(Decimal::MAX),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn request_carries_order_reference_and_callbacks() {
        let service = service(MockGateway::new());
        let order = order(vec![(dec!(12.00), 3)], None);

        let request = service.build_checkout_request(&order, &urls()).unwrap();
        assert_eq!(request.mode, CheckoutMode::Payment);
        assert_eq!(request.client_reference_id, order.id.to_string());
        assert_eq!(request.success_url, urls().success_url);
        assert_eq!(request.cancel_url, urls().cancel_url);
        assert_eq!(request.line_items[0].price_data.currency, "usd");
        assert_eq!(request.line_items[0].quantity, 3);
        assert!(request.discounts.is_empty());
    }

    #[test]
    fn request_rejects_non_positive_quantity() {
        let service = service(MockGateway::new());
        let order = order(vec![(dec!(5.00), 0)], None);

        let err = service.build_checkout_request(&order, &urls()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn initiate_without_discount_creates_only_session() {
        let mut gateway = MockGateway::new();
        gateway.expect_create_coupon().never();
        gateway
            .expect_create_checkout_session()
            .times(1)
            .withf(|params| params.discounts.is_empty() && params.line_items.len() == 2)
            .returning(|_| Ok(hosted(Some("https://checkout.stripe.com/c/pay/cs_test_1"))));

        let order = order(vec![(dec!(4.50), 1), (dec!(19.99), 2)], None);
        let url = service(gateway).initiate(&order, &urls()).await.unwrap();
        assert_eq!(url, "https://checkout.stripe.com/c/pay/cs_test_1");
    }

    #[tokio::test]
    async fn initiate_with_discount_creates_coupon_before_session() {
        let mut seq = Sequence::new();
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_coupon()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|params| {
                params.name == "SUMMER"
                    && params.percent_off == dec!(15)
                    && params.duration == CouponDuration::Once
            })
            .returning(|_| {
                Ok(RemoteCoupon {
                    id: "Z4OV52SU".into(),
                })
            });
        gateway
            .expect_create_checkout_session()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|params| {
                params.discounts
                    == vec![DiscountRef {
                        coupon: "Z4OV52SU".into(),
                    }]
            })
            .returning(|_| Ok(hosted(Some("https://checkout.stripe.com/c/pay/cs_test_1"))));

        let order = order(
            vec![(dec!(10.00), 1)],
            Some(AppliedDiscount {
                code: "SUMMER".into(),
                percent_off: dec!(15),
            }),
        );
        service(gateway).initiate(&order, &urls()).await.unwrap();
    }

    #[tokio::test]
    async fn initiate_rejects_empty_order_without_calling_gateway() {
        let mut gateway = MockGateway::new();
        gateway.expect_create_coupon().never();
        gateway.expect_create_checkout_session().never();

        let err = service(gateway)
            .initiate(&order(vec![], None), &urls())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn session_without_url_is_unavailable() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_checkout_session()
            .returning(|_| Ok(hosted(None)));

        let err = service(gateway)
            .initiate(&order(vec![(dec!(1.00), 1)], None), &urls())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PaymentUnavailable(_)));
    }

    #[tokio::test]
    async fn session_failure_after_coupon_propagates() {
        let mut gateway = MockGateway::new();
        gateway.expect_create_coupon().times(1).returning(|_| {
            Ok(RemoteCoupon {
                id: "orphan".into(),
            })
        });
        gateway
            .expect_create_checkout_session()
            .times(1)
            .returning(|_| Err(ServiceError::PaymentUnavailable("boom".into())));

        let order = order(
            vec![(dec!(1.00), 1)],
            Some(AppliedDiscount {
                code: "SUMMER".into(),
                percent_off: dec!(10),
            }),
        );
        let err = service(gateway).initiate(&order, &urls()).await.unwrap_err();
        assert!(matches!(err, ServiceError::PaymentUnavailable(_)));
    }

    proptest! {
        #[test]
        fn request_has_one_item_per_line(
            lines in prop::collection::vec((0i64..10_000_000, 1i32..100), 0..20)
        ) {
            let service = service(MockGateway::new());
            let items: Vec<(Decimal, i32)> = lines
                .iter()
                .map(|(cents, qty)| (Decimal::new(*cents, 2), *qty))
                .collect();
            let order = order(items, None);

            let request = service.build_checkout_request(&order, &urls()).unwrap();
            prop_assert_eq!(request.line_items.len(), lines.len());
            for (item, (cents, qty)) in request.line_items.iter().zip(lines.iter()) {
                prop_assert_eq!(item.price_data.unit_amount, *cents);
                prop_assert_eq!(item.quantity, i64::from(*qty));
            }
        }

        #[test]
        fn minor_units_match_rounded_hundredfold(mills in 0i64..1_000_000_000) {
            let amount = Decimal::new(mills, 3);
            let expected = (amount * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .unwrap();
            prop_assert_eq!(to_minor_units(amount).unwrap(), expected);
        }
    }
}
