use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::gate::AuthUser,
    cache::{
        keys::{TASKS_PREFIX, TASK_PREFIX},
        middleware::{cache_invalidate, cache_read, CacheInvalidate, CacheRead},
        store::CacheStore,
    },
    error::AppError,
    pagination::{self, PageQuery},
    response::ApiResponse,
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, TaskList, UpdateTaskRequest},
        repo_types::Task,
        services,
    },
};

// --- routers ---

pub fn read_routes(state: &AppState) -> Router<AppState> {
    let ttl = Duration::from_secs(state.config.cache.ttl_seconds);
    let store: Arc<dyn CacheStore> = Arc::clone(&state.cache);
    let list_cache = CacheRead::new(Arc::clone(&store), TASKS_PREFIX, ttl);
    let item_cache = CacheRead::new(store, TASK_PREFIX, ttl);

    Router::new()
        .route(
            "/tasks",
            get(list_tasks).layer(from_fn_with_state(list_cache, cache_read)),
        )
        .route(
            "/tasks/:id",
            get(get_task).layer(from_fn_with_state(item_cache, cache_read)),
        )
}

pub fn write_routes(state: &AppState) -> Router<AppState> {
    let lists = CacheInvalidate::new(Arc::clone(&state.cache), TASKS_PREFIX);
    let items = CacheInvalidate::new(Arc::clone(&state.cache), TASK_PREFIX);
    let invalidate_lists = from_fn_with_state(lists, cache_invalidate);
    let invalidate_items = from_fn_with_state(items, cache_invalidate);

    Router::new()
        .route("/tasks", post(create_task).layer(invalidate_lists.clone()))
        .route(
            "/tasks/:id",
            patch(update_task)
                .layer(invalidate_lists.clone())
                .layer(invalidate_items.clone())
                .merge(
                    delete(delete_task)
                        .layer(invalidate_lists)
                        .layer(invalidate_items),
                ),
        )
}

// --- handlers ---

#[instrument(skip(state, auth, query), fields(user_id = %auth.id, username = %auth.username))]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<TaskList>>, AppError> {
    let params = query.map(|Query(q)| q).unwrap_or_default().normalize();
    let page = services::list(state.tasks.as_ref(), auth.id, params).await?;
    let meta = pagination::metadata(params.page, params.limit, page.total);
    Ok(Json(ApiResponse::ok(
        TaskList {
            tasks: page.items,
            pagination: meta,
        },
        "Tasks retrieved successfully",
    )))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id, username = %auth.username))]
pub async fn get_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Task>>, AppError> {
    let task = services::get(state.tasks.as_ref(), &id, auth.id).await?;
    Ok(Json(ApiResponse::ok(task, "Task retrieved successfully")))
}

#[instrument(skip(state, auth, payload), fields(user_id = %auth.id, username = %auth.username))]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Task>>), AppError> {
    let Json(body) =
        payload.map_err(|_| AppError::Validation(services::TITLE_REQUIRED_MESSAGE.into()))?;
    let task = services::create(state.tasks.as_ref(), auth.id, body.title, body.description).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(task, "Task created successfully")),
    ))
}

#[instrument(skip(state, auth, payload), fields(user_id = %auth.id, username = %auth.username))]
pub async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Task>>, AppError> {
    // a bad id wins over a bad body
    services::parse_task_id(&id)?;
    let Json(body) = payload.map_err(|_| AppError::Validation("Invalid request body".into()))?;
    let task = services::update(state.tasks.as_ref(), &id, auth.id, body.into()).await?;
    Ok(Json(ApiResponse::ok(task, "Task updated successfully")))
}

#[instrument(skip(state, auth), fields(user_id = %auth.id, username = %auth.username))]
pub async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Task>>, AppError> {
    let task = services::delete(state.tasks.as_ref(), &id, auth.id).await?;
    Ok(Json(ApiResponse::ok(task, "Task deleted successfully")))
}
