//! Per-visitor session state
//!
//! The storefront keeps a session id in a cookie and stores small string
//! values against it. The order-creation flow writes [`ORDER_ID_KEY`]; checkout
//! only reads it.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::COOKIE, request::Parts},
};
use dashmap::DashMap;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

/// Session key under which the storefront records the order being paid
pub const ORDER_ID_KEY: &str = "order_id";

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, ServiceError>;
    async fn insert(&self, session_id: &str, key: &str, value: &str) -> Result<(), ServiceError>;
}

/// Process-local session store, suitable for development and tests
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, HashMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|session| session.get(key).cloned()))
    }

    async fn insert(&self, session_id: &str, key: &str, value: &str) -> Result<(), ServiceError> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Redis-backed sessions: one hash per session, expiring after the configured TTL
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Arc<redis::Client>,
    namespace: String,
    ttl: Duration,
}

impl RedisSessionStore {
    pub fn new(client: Arc<redis::Client>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            ttl,
        }
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}:{}", self.namespace, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let value: Option<String> = conn.hget(self.session_key(session_id), key).await?;
        Ok(value)
    }

    async fn insert(&self, session_id: &str, key: &str, value: &str) -> Result<(), ServiceError> {
        let session_key = self.session_key(session_id);
        let mut conn = self.client.get_async_connection().await?;
        conn.hset::<_, _, _, ()>(&session_key, key, value).await?;
        conn.expire::<_, ()>(&session_key, self.ttl.as_secs() as usize)
            .await?;
        Ok(())
    }
}

/// Session id carried by the request cookie, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie(pub Option<String>);

impl SessionCookie {
    /// Resolve the order id stored in this session.
    ///
    /// A missing cookie, a missing key and a malformed id all mean the same
    /// thing to the shopper: there is no order to pay.
    pub async fn order_id(&self, store: &dyn SessionStore) -> Result<Uuid, ServiceError> {
        let not_found = || ServiceError::NotFound("Order not found".to_string());

        let Some(session_id) = self.0.as_deref() else {
            debug!("request carries no session cookie");
            return Err(not_found());
        };

        let raw = store.get(session_id, ORDER_ID_KEY).await?.ok_or_else(|| {
            debug!("session has no order id");
            not_found()
        })?;

        Uuid::parse_str(raw.trim()).map_err(|_| {
            debug!(order_id = %raw, "session holds a malformed order id");
            not_found()
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionCookie {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let name = state.config.session_cookie_name.as_str();
        let session_id = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| cookie_value(header, name));
        Ok(SessionCookie(session_id))
    }
}

/// Value of cookie `name` within a `Cookie` header
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        let value = value.trim().trim_matches('"');
        (key.trim() == name && !value.is_empty()).then(|| value.to_string())
    })
}
