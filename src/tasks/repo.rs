use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::tasks::repo_types::{NewTask, Task, TaskChanges};

const TASK_COLUMNS: &str = "id, user_id, title, description, completed, created_at, updated_at";

/// Owner-scoped task storage. A task owned by someone else is indistinguishable
/// from a missing one.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Newest first.
    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>>;
    async fn count_by_owner(&self, owner: Uuid) -> anyhow::Result<i64>;
    async fn find_one(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>>;
    async fn insert(&self, new_task: NewTask) -> anyhow::Result<Task>;
    async fn update(&self, id: Uuid, owner: Uuid, changes: &TaskChanges) -> anyhow::Result<Option<Task>>;
    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>>;
}

#[derive(Clone)]
pub struct PgTaskStore {
    db: PgPool,
}

impl PgTaskStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count_by_owner(&self, owner: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = $1")
            .bind(owner)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn find_one(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(task)
    }

    async fn insert(&self, new_task: NewTask) -> anyhow::Result<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (user_id, title, description)
            VALUES ($1, $2, $3)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(new_task.user_id)
        .bind(&new_task.title)
        .bind(&new_task.description)
        .fetch_one(&self.db)
        .await?;
        Ok(task)
    }

    async fn update(&self, id: Uuid, owner: Uuid, changes: &TaskChanges) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                completed = COALESCE($5, completed),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.completed)
        .fetch_optional(&self.db)
        .await?;
        Ok(task)
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "DELETE FROM tasks WHERE id = $1 AND user_id = $2 RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(task)
    }
}

/// Process-local task table, kept in insertion order.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .rev()
            .filter(|t| t.user_id == owner)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn count_by_owner(&self, owner: Uuid) -> anyhow::Result<i64> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().filter(|t| t.user_id == owner).count() as i64)
    }

    async fn find_one(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .find(|t| t.id == id && t.user_id == owner)
            .cloned())
    }

    async fn insert(&self, new_task: NewTask) -> anyhow::Result<Task> {
        let task = Task {
            id: Uuid::new_v4(),
            user_id: new_task.user_id,
            title: new_task.title,
            description: new_task.description,
            completed: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: Uuid, owner: Uuid, changes: &TaskChanges) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id == id && t.user_id == owner) else {
            return Ok(None);
        };
        if let Some(title) = &changes.title {
            task.title = title.clone();
        }
        if let Some(description) = &changes.description {
            task.description = Some(description.clone());
        }
        if let Some(completed) = changes.completed {
            task.completed = completed;
        }
        task.updated_at = Some(OffsetDateTime::now_utc());
        Ok(Some(task.clone()))
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let position = tasks.iter().position(|t| t.id == id && t.user_id == owner);
        Ok(position.map(|i| tasks.remove(i)))
    }
}
