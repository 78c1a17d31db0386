use std::net::SocketAddr;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::{auth, response::ApiResponse, state::AppState, tasks};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router(state.clone()))
                .merge(tasks::router(state.clone()))
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub database: &'static str,
    pub cache: &'static str,
}

/// Database down is fatal for the service, cache down only degrades it.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    let database = match state.users.ping().await {
        Ok(()) => "up",
        Err(e) => {
            warn!(error = %e, "health: database unreachable");
            "down"
        }
    };
    let cache = match state.cache.ping().await {
        Ok(()) => "up",
        Err(e) => {
            warn!(error = %e, "health: cache unreachable");
            "down"
        }
    };

    let healthy = database == "up";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ApiResponse {
            success: healthy,
            data: Some(HealthStatus { database, cache }),
            message: Some(if healthy { "Service is healthy" } else { "Service is unhealthy" }.into()),
            error: None,
            cached: None,
        }),
    )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::jwt::tests::expired_token,
        cache::store::{CacheStore, MemoryCache},
    };

    struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("redis unreachable")
        }
        async fn set_with_ttl(&self, _k: &str, _v: String, _t: Duration) -> anyhow::Result<()> {
            anyhow::bail!("redis unreachable")
        }
        async fn delete_by_pattern(&self, _p: &str) -> anyhow::Result<u64> {
            anyhow::bail!("redis unreachable")
        }
        async fn ping(&self) -> anyhow::Result<()> {
            anyhow::bail!("redis unreachable")
        }
    }

    struct Response {
        status: StatusCode,
        json: Value,
        raw: String,
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let raw = String::from_utf8(bytes.to_vec()).unwrap();
        let json = serde_json::from_str(&raw).unwrap_or(Value::Null);
        Response { status, json, raw }
    }

    /// Registers and logs in, returning (user id, token).
    async fn sign_up(app: &Router, username: &str, email: &str) -> (String, String) {
        let res = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "email": email, "password": "Passw0rd1" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.raw);
        let id = res.json["data"]["id"].as_str().unwrap().to_string();

        let res = call(
            app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "Passw0rd1" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.raw);
        let token = res.json["token"].as_str().unwrap().to_string();
        (id, token)
    }

    async fn wait_for_key(cache: &dyn CacheStore, key: &str) {
        for _ in 0..200 {
            if cache.get(key).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache key {key} never written");
    }

    fn raw_data(raw: &str) -> String {
        #[derive(serde::Deserialize)]
        struct Envelope<'a> {
            #[serde(borrow)]
            data: &'a serde_json::value::RawValue,
        }
        let envelope: Envelope<'_> = serde_json::from_str(raw).unwrap();
        envelope.data.get().to_owned()
    }

    #[tokio::test]
    async fn task_lifecycle_with_cache() {
        let state = AppState::fake();
        let cache = Arc::clone(&state.cache);
        let app = build_app(state);

        let (user_id, token) = sign_up(&app, "alice", "a@test.com").await;
        assert_eq!(token.split('.').count(), 3);

        let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": "T1" }))).await;
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.json["message"], "Task created successfully");
        assert_eq!(res.json["data"]["completed"], false);
        let task_id = res.json["data"]["id"].as_str().unwrap().to_string();
        let path = format!("/api/tasks/{task_id}");

        let first = call(&app, "GET", &path, Some(token.as_str()), None).await;
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.json.get("cached").is_none());
        wait_for_key(cache.as_ref(), &format!("task:{user_id}:{path}")).await;

        let second = call(&app, "GET", &path, Some(token.as_str()), None).await;
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.json["cached"], true);
        assert_eq!(second.json["message"], "Data retrieved from cache");
        assert_eq!(raw_data(&first.raw), raw_data(&second.raw));

        let res = call(
            &app,
            "PATCH",
            &path,
            Some(token.as_str()),
            Some(json!({ "title": "T1-updated" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["message"], "Task updated successfully");

        let third = call(&app, "GET", &path, Some(token.as_str()), None).await;
        assert_eq!(third.status, StatusCode::OK);
        assert!(third.json.get("cached").is_none());
        assert_eq!(third.json["data"]["title"], "T1-updated");

        let res = call(&app, "DELETE", &path, Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["message"], "Task deleted successfully");

        let res = call(&app, "GET", &path, Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.json["message"], "Task not found");
    }

    #[tokio::test]
    async fn list_is_paginated_and_refreshed_after_create() {
        let state = AppState::fake();
        let cache = Arc::clone(&state.cache);
        let app = build_app(state);
        let (user_id, token) = sign_up(&app, "alice", "a@test.com").await;

        for i in 0..12 {
            let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": format!("t{i}") }))).await;
            assert_eq!(res.status, StatusCode::CREATED);
        }

        let uri = "/api/tasks?page=2&limit=5";
        let res = call(&app, "GET", uri, Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["data"]["tasks"].as_array().unwrap().len(), 5);
        assert_eq!(res.json["data"]["tasks"][0]["title"], "t6");
        let meta = &res.json["data"]["pagination"];
        assert_eq!(meta["currentPage"], 2);
        assert_eq!(meta["totalPages"], 3);
        assert_eq!(meta["totalItems"], 12);
        assert_eq!(meta["itemsPerPage"], 5);
        assert_eq!(meta["hasNextPage"], true);
        assert_eq!(meta["hasPreviousPage"], true);

        wait_for_key(cache.as_ref(), &format!("tasks:{user_id}:{uri}")).await;
        let cached = call(&app, "GET", uri, Some(token.as_str()), None).await;
        assert_eq!(cached.json["cached"], true);
        assert_eq!(cached.json["data"]["pagination"]["totalItems"], 12);

        call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": "t12" }))).await;
        let fresh = call(&app, "GET", uri, Some(token.as_str()), None).await;
        assert!(fresh.json.get("cached").is_none());
        assert_eq!(fresh.json["data"]["pagination"]["totalItems"], 13);

        let garbage = call(&app, "GET", "/api/tasks?page=abc&limit=1000", Some(token.as_str()), None).await;
        assert_eq!(garbage.json["data"]["pagination"]["currentPage"], 1);
        assert_eq!(garbage.json["data"]["pagination"]["itemsPerPage"], 100);
    }

    #[tokio::test]
    async fn item_mutations_refresh_cached_list() {
        let state = AppState::fake();
        let cache = Arc::clone(&state.cache);
        let app = build_app(state);
        let (user_id, token) = sign_up(&app, "alice", "a@test.com").await;
        let list_key = format!("tasks:{user_id}:/api/tasks");

        let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": "T1" }))).await;
        let path = format!("/api/tasks/{}", res.json["data"]["id"].as_str().unwrap());

        call(&app, "GET", "/api/tasks", Some(token.as_str()), None).await;
        wait_for_key(cache.as_ref(), &list_key).await;
        let cached = call(&app, "GET", "/api/tasks", Some(token.as_str()), None).await;
        assert_eq!(cached.json["cached"], true);
        assert_eq!(cached.json["data"]["tasks"][0]["title"], "T1");

        let res = call(&app, "PATCH", &path, Some(token.as_str()), Some(json!({ "title": "T2" }))).await;
        assert_eq!(res.status, StatusCode::OK);
        let fresh = call(&app, "GET", "/api/tasks", Some(token.as_str()), None).await;
        assert!(fresh.json.get("cached").is_none());
        assert_eq!(fresh.json["data"]["tasks"][0]["title"], "T2");

        wait_for_key(cache.as_ref(), &list_key).await;
        let cached = call(&app, "GET", "/api/tasks", Some(token.as_str()), None).await;
        assert_eq!(cached.json["cached"], true);
        assert_eq!(cached.json["data"]["pagination"]["totalItems"], 1);

        let res = call(&app, "DELETE", &path, Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::OK);
        let fresh = call(&app, "GET", "/api/tasks", Some(token.as_str()), None).await;
        assert!(fresh.json.get("cached").is_none());
        assert_eq!(fresh.json["data"]["pagination"]["totalItems"], 0);
        assert_eq!(fresh.json["data"]["tasks"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let app = build_app(AppState::fake());
        let (_, alice) = sign_up(&app, "alice", "a@test.com").await;
        let (_, bob) = sign_up(&app, "bob", "b@test.com").await;

        let res = call(&app, "POST", "/api/tasks", Some(alice.as_str()), Some(json!({ "title": "secret" }))).await;
        let path = format!("/api/tasks/{}", res.json["data"]["id"].as_str().unwrap());

        assert_eq!(call(&app, "GET", &path, Some(alice.as_str()), None).await.status, StatusCode::OK);
        assert_eq!(call(&app, "GET", &path, Some(bob.as_str()), None).await.status, StatusCode::NOT_FOUND);
        let res = call(&app, "PATCH", &path, Some(bob.as_str()), Some(json!({ "completed": true }))).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(call(&app, "DELETE", &path, Some(bob.as_str()), None).await.status, StatusCode::NOT_FOUND);

        let list = call(&app, "GET", "/api/tasks", Some(bob.as_str()), None).await;
        assert_eq!(list.json["data"]["pagination"]["totalItems"], 0);
        assert_eq!(list.json["data"]["pagination"]["totalPages"], 1);
    }

    #[tokio::test]
    async fn authentication_failures() {
        let state = AppState::fake();
        let keys = state.keys.clone();
        let app = build_app(state);
        let (user_id, _) = sign_up(&app, "alice", "a@test.com").await;

        let res = call(&app, "GET", "/api/tasks", None, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.json["success"], false);
        assert_eq!(res.json["message"], "Could not validate token");

        let res = call(&app, "GET", "/api/tasks", Some("invalid-token"), None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.json["message"], "Invalid token");

        let mut user = crate::auth::jwt::tests::sample_user();
        user.id = user_id.parse().unwrap();
        let expired = expired_token(&keys, &user);
        let res = call(&app, "GET", "/api/tasks", Some(expired.as_str()), None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.json["message"], "Token has expired");

        let res = call(&app, "GET", "/api/me", None, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validation_errors() {
        let app = build_app(AppState::fake());
        let (_, token) = sign_up(&app, "alice", "a@test.com").await;

        let res = call(&app, "GET", "/api/tasks/invalid-id", Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.json["message"], "Invalid ID format");

        let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": "   " }))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.json["message"], "Title is required and must be a string");

        let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": 42 }))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        let res = call(&app, "DELETE", "/api/tasks/invalid-id", Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn registration_and_login_rules() {
        let app = build_app(AppState::fake());
        sign_up(&app, "alice", "a@test.com").await;

        let register = |username: &str, email: &str, password: &str| {
            json!({ "username": username, "email": email, "password": password })
        };

        let res = call(&app, "POST", "/api/auth/register", None, Some(register("alice2", "A@test.com", "Passw0rd1"))).await;
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.json["message"], "User with this email already exists");

        let res = call(&app, "POST", "/api/auth/register", None, Some(register("alice", "z@test.com", "Passw0rd1"))).await;
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.json["message"], "Username already exists");

        let res = call(&app, "POST", "/api/auth/register", None, Some(register("carol", "invalidemail.com", "Passw0rd1"))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.json["message"], "Invalid email format");

        let res = call(&app, "POST", "/api/auth/register", None, Some(register("carol", "c@test.com", "weak"))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        let res = call(&app, "POST", "/api/auth/register", None, Some(json!({ "username": "carol" }))).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);

        let res = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@test.com", "password": "Wrong0000" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.json["message"], "Invalid email or password");

        let res = call(&app, "POST", "/api/auth/logout", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn profile_of_authenticated_user() {
        let app = build_app(AppState::fake());
        let (user_id, token) = sign_up(&app, "alice", "a@test.com").await;
        let res = call(&app, "GET", "/api/me", Some(token.as_str()), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["data"]["id"], user_id.as_str());
        assert_eq!(res.json["data"]["username"], "alice");
    }

    #[tokio::test]
    async fn unavailable_cache_does_not_break_requests() {
        let app = build_app(AppState::fake_with_cache(Arc::new(DownCache)));
        let (_, token) = sign_up(&app, "alice", "a@test.com").await;

        let res = call(&app, "POST", "/api/tasks", Some(token.as_str()), Some(json!({ "title": "T1" }))).await;
        assert_eq!(res.status, StatusCode::CREATED);
        let path = format!("/api/tasks/{}", res.json["data"]["id"].as_str().unwrap());

        for _ in 0..2 {
            let res = call(&app, "GET", &path, Some(token.as_str()), None).await;
            assert_eq!(res.status, StatusCode::OK);
            assert!(res.json.get("cached").is_none());
        }
        let res = call(&app, "PATCH", &path, Some(token.as_str()), Some(json!({ "completed": true }))).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["data"]["completed"], true);

        let health = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(health.status, StatusCode::OK);
        assert_eq!(health.json["data"]["cache"], "down");
    }

    #[tokio::test]
    async fn health_reports_up() {
        let app = build_app(AppState::fake_with_cache(Arc::new(MemoryCache::new())));
        let res = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["data"]["database"], "up");
        assert_eq!(res.json["data"]["cache"], "up");
    }
}
