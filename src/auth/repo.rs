use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, created_at, last_login_at, is_active, email_verified";

/// Which unique user column a registration collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UserConflict {
    #[error("User with this email already exists")]
    Email,
    #[error("Username already exists")]
    Username,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Any user already holding `email` or `username`, in one query.
    async fn find_conflict(&self, email: &str, username: &str) -> anyhow::Result<Option<User>>;
    /// Fails with a [`UserConflict`] when email or username is already taken.
    async fn create(&self, new_user: NewUser) -> anyhow::Result<User>;
    async fn touch_last_login(&self, id: Uuid) -> anyhow::Result<()>;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_conflict(&self, email: &str, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR username = $2 LIMIT 1"
        ))
        .bind(email.to_lowercase())
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(new_user.email.to_lowercase())
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await;

        match user {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let conflict = match db.constraint() {
                    Some(name) if name.contains("username") => UserConflict::Username,
                    _ => UserConflict::Email,
                };
                Err(conflict.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn touch_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

/// Process-local user table used when no database is configured.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn set_active(&self, id: Uuid, active: bool) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.is_active = active;
        }
    }

    #[cfg(test)]
    pub async fn remove(&self, id: Uuid) {
        self.users.write().await.remove(&id);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_conflict(&self, email: &str, username: &str) -> anyhow::Result<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.write().await;
        let email = new_user.email.to_lowercase();
        if users.values().any(|u| u.email == email) {
            return Err(UserConflict::Email.into());
        }
        if users.values().any(|u| u.username == new_user.username) {
            return Err(UserConflict::Username.into());
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            created_at: OffsetDateTime::now_utc(),
            last_login_at: None,
            is_active: true,
            email_verified: false,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn touch_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
