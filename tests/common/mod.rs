#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use shop_checkout::{
    app_router,
    config::{AppConfig, StripeConfig},
    db,
    entities::{coupon, order, order_item, product},
    errors::ServiceError,
    repositories::OrderRepository,
    services::{
        payment_gateway::{CheckoutSessionParams, CouponParams, HostedCheckout, RemoteCoupon},
        CheckoutService, PaymentGateway,
    },
    session::{InMemorySessionStore, SessionStore, ORDER_ID_KEY},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_HOST: &str = "shop.test";

/// One outbound call seen by [`RecordingGateway`]
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayCall {
    Coupon(CouponParams),
    Session(CheckoutSessionParams),
}

/// Payment gateway double that records calls and answers with canned objects.
#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    fail_sessions: AtomicBool,
}

impl RecordingGateway {
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_sessions(&self) {
        self.fail_sessions.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: GatewayCall) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_coupon(&self, params: &CouponParams) -> Result<RemoteCoupon, ServiceError> {
        let n = self.record(GatewayCall::Coupon(params.clone()));
        Ok(RemoteCoupon {
            id: format!("coupon_{}", n),
        })
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<HostedCheckout, ServiceError> {
        let n = self.record(GatewayCall::Session(params.clone()));
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentUnavailable(
                "connection reset by peer".into(),
            ));
        }
        Ok(HostedCheckout {
            id: format!("cs_test_{}", n),
            url: Some(format!("https://checkout.stripe.com/c/pay/cs_test_{}", n)),
        })
    }
}

/// Application wired to in-memory SQLite, in-memory sessions and a recording gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    pub sessions: Arc<InMemorySessionStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            StripeConfig::new("sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
        );
        cfg.auto_migrate = true;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let gateway = Arc::new(RecordingGateway::default());
        let sessions = Arc::new(InMemorySessionStore::new());
        let checkout = CheckoutService::new(
            OrderRepository::new(db.clone()),
            gateway.clone(),
            cfg.stripe.currency.clone(),
        );

        let state = AppState {
            db,
            config: cfg,
            sessions: sessions.clone(),
            checkout,
        };

        Self {
            router: app_router(state.clone()),
            state,
            gateway,
            sessions,
        }
    }

    /// Send a request carrying the session cookie, if any, and a `Host` header.
    pub async fn request(&self, method: Method, uri: &str, session: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, TEST_HOST);
        if let Some(session) = session {
            builder = builder.header(
                header::COOKIE,
                format!("{}={}", self.state.config.session_cookie_name, session),
            );
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Create a session pointing at `order_id` and return its id.
    pub async fn session_for(&self, order_id: Uuid) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        self.sessions
            .insert(&session_id, ORDER_ID_KEY, &order_id.to_string())
            .await
            .unwrap();
        session_id
    }

    pub async fn seed_coupon(&self, code: &str, percent: i32) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            valid_from: Set(now - Duration::days(1)),
            valid_to: Set(now + Duration::days(30)),
            discount: Set(percent),
            active: Set(true),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("insert coupon")
    }

    /// Insert an order with one item per `(product name, unit price, quantity)`.
    pub async fn seed_order(
        &self,
        lines: &[(&str, Decimal, i32)],
        coupon: Option<&coupon::Model>,
    ) -> Uuid {
        let db = self.state.db.as_ref();
        let order_id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(order_id),
            first_name: Set("Ada".into()),
            last_name: Set("Lovelace".into()),
            email: Set("ada@example.com".into()),
            address: Set("12 St James's Square".into()),
            postal_code: Set("SW1Y 4JH".into()),
            city: Set("London".into()),
            paid: Set(false),
            stripe_id: Set(None),
            coupon_id: Set(coupon.map(|c| c.id)),
            discount: Set(coupon.map(|c| c.discount).unwrap_or(0)),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert order");

        for (name, price, quantity) in lines {
            let product_id = Uuid::new_v4();
            product::ActiveModel {
                id: Set(product_id),
                name: Set(name.to_string()),
                slug: Set(format!("{}-{}", name.to_lowercase().replace(' ', "-"), product_id.simple())),
                price: Set(*price),
                available: Set(true),
                created_at: Set(Utc::now()),
            }
            .insert(db)
            .await
            .expect("insert product");

            order_item::ActiveModel {
                order_id: Set(order_id),
                product_id: Set(product_id),
                price: Set(*price),
                quantity: Set(*quantity),
                ..Default::default()
            }
            .insert(db)
            .await
            .expect("insert order item");
        }

        order_id
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
