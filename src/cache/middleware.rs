//! Read-through and invalidate-on-write wrappers for JSON handlers.
//!
//! Both run as `from_fn_with_state` middleware inside the authentication
//! gate, so the caller's [`AuthUser`] is already in the request extensions.
//! Cache failures are logged and never change what the client receives.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::{OriginalUri, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    keys::{cache_key, invalidation_pattern},
    store::CacheStore,
};
use crate::{auth::gate::AuthUser, error::AppError, response::ApiResponse};

/// State for [`cache_read`].
#[derive(Clone)]
pub struct CacheRead {
    store: Arc<dyn CacheStore>,
    prefix: &'static str,
    ttl: Duration,
}

impl CacheRead {
    pub fn new(store: Arc<dyn CacheStore>, prefix: &'static str, ttl: Duration) -> Self {
        Self { store, prefix, ttl }
    }
}

/// State for [`cache_invalidate`].
#[derive(Clone)]
pub struct CacheInvalidate {
    store: Arc<dyn CacheStore>,
    prefix: &'static str,
}

impl CacheInvalidate {
    pub fn new(store: Arc<dyn CacheStore>, prefix: &'static str) -> Self {
        Self { store, prefix }
    }
}

fn owner_of(req: &Request) -> Option<Uuid> {
    req.extensions().get::<AuthUser>().map(|u| u.id)
}

/// Path and query as the client sent them, before any `nest` stripping.
fn full_path(req: &Request) -> String {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|u| &u.0)
        .unwrap_or_else(|| req.uri());
    uri.path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned())
}

#[derive(Deserialize)]
struct Envelope<'a> {
    success: bool,
    #[serde(borrow, default)]
    data: Option<&'a RawValue>,
}

/// The raw `data` text of a successful envelope, if it carries any.
fn cacheable_data(body: &[u8]) -> Option<String> {
    let envelope: Envelope<'_> = serde_json::from_slice(body).ok()?;
    if !envelope.success {
        return None;
    }
    envelope.data.map(|raw| raw.get().to_owned())
}

fn is_json(res: &Response) -> bool {
    res.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

pub async fn cache_read(State(policy): State<CacheRead>, req: Request, next: Next) -> Response {
    let key = cache_key(policy.prefix, owner_of(&req), &full_path(&req));

    match policy.store.get(&key).await {
        Ok(Some(cached)) => match RawValue::from_string(cached) {
            Ok(data) => {
                debug!(key = %key, "cache hit");
                return (StatusCode::OK, Json(ApiResponse::cached(data))).into_response();
            }
            Err(e) => warn!(key = %key, error = %e, "unreadable cache entry ignored"),
        },
        Ok(None) => debug!(key = %key, "cache miss"),
        Err(e) => warn!(key = %key, error = %e, "cache lookup failed, continuing without cache"),
    }

    let response = next.run(req).await;
    if !response.status().is_success() || !is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(key = %key, error = %e, "failed to buffer response body");
            return AppError::Internal(anyhow::anyhow!(e.to_string())).into_response();
        }
    };

    if let Some(data) = cacheable_data(&bytes) {
        let store = Arc::clone(&policy.store);
        let ttl = policy.ttl;
        tokio::spawn(async move {
            match store.set_with_ttl(&key, data, ttl).await {
                Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set"),
                Err(e) => warn!(key = %key, error = %e, "cache save failed"),
            }
        });
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Clears every key of the prefix for the caller once the handler succeeded.
/// The deletion is awaited so the next read from the same client misses.
pub async fn cache_invalidate(
    State(policy): State<CacheInvalidate>,
    req: Request,
    next: Next,
) -> Response {
    let pattern = invalidation_pattern(policy.prefix, owner_of(&req));

    let response = next.run(req).await;
    if !response.status().is_success() {
        return response;
    }

    match policy.store.delete_by_pattern(&pattern).await {
        Ok(removed) => debug!(pattern = %pattern, removed, "cache invalidated"),
        Err(e) => warn!(pattern = %pattern, error = %e, "cache invalidation failed"),
    }
    response
}
