use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    pagination::{self, PageParams},
    tasks::{
        repo::TaskStore,
        repo_types::{NewTask, Task, TaskChanges},
    },
};

pub const TITLE_REQUIRED_MESSAGE: &str = "Title is required and must be a string";

/// A page of tasks and the owner's total count.
#[derive(Debug)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: i64,
}

/// Syntactic id check, done before any storage access.
pub fn parse_task_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation("Invalid ID format".into()))
}

fn required_title(title: Option<String>) -> Result<String, AppError> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation(TITLE_REQUIRED_MESSAGE.into()))
}

pub async fn list(tasks: &dyn TaskStore, owner: Uuid, page: PageParams) -> Result<TaskPage, AppError> {
    let offset = pagination::skip(page.page, page.limit);
    let (items, total) = tokio::try_join!(
        tasks.list_by_owner(owner, page.limit, offset),
        tasks.count_by_owner(owner),
    )?;
    debug!(user_id = %owner, returned = items.len(), total, "tasks listed");
    Ok(TaskPage { items, total })
}

pub async fn get(tasks: &dyn TaskStore, raw_id: &str, owner: Uuid) -> Result<Task, AppError> {
    let id = parse_task_id(raw_id)?;
    tasks
        .find_one(id, owner)
        .await?
        .ok_or_else(AppError::task_not_found)
}

pub async fn create(
    tasks: &dyn TaskStore,
    owner: Uuid,
    title: Option<String>,
    description: Option<String>,
) -> Result<Task, AppError> {
    let title = required_title(title)?;
    let task = tasks
        .insert(NewTask {
            user_id: owner,
            title,
            description,
        })
        .await?;
    info!(user_id = %owner, task_id = %task.id, "task created");
    Ok(task)
}

pub async fn update(
    tasks: &dyn TaskStore,
    raw_id: &str,
    owner: Uuid,
    mut changes: TaskChanges,
) -> Result<Task, AppError> {
    let id = parse_task_id(raw_id)?;
    if changes.title.is_some() {
        changes.title = Some(required_title(changes.title)?);
    }
    let task = tasks
        .update(id, owner, &changes)
        .await?
        .ok_or_else(AppError::task_not_found)?;
    info!(user_id = %owner, task_id = %task.id, "task updated");
    Ok(task)
}

pub async fn delete(tasks: &dyn TaskStore, raw_id: &str, owner: Uuid) -> Result<Task, AppError> {
    let id = parse_task_id(raw_id)?;
    let task = tasks
        .delete(id, owner)
        .await?
        .ok_or_else(AppError::task_not_found)?;
    info!(user_id = %owner, task_id = %task.id, "task deleted");
    Ok(task)
}
