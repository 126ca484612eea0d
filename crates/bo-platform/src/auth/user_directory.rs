//! User Directory
//!
//! Read-only lookup of login accounts and their roles. User administration
//! lives outside this crate; the credential lifecycle only needs to find an
//! account by username or id.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::shared::error::Result;

/// A role held by a user: numeric id plus human-readable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, sqlx::FromRow)]
pub struct RoleRef {
    pub id: i64,
    pub code: String,
}

impl RoleRef {
    pub fn new(id: i64, code: impl Into<String>) -> Self {
        Self { id, code: code.into() }
    }
}

#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Argon2id PHC string
    pub password_hash: String,
    pub is_active: bool,
    pub language: Option<String>,
    pub roles: Vec<RoleRef>,
}

impl UserAccount {
    pub fn new(id: impl Into<String>, username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
            password_hash: password_hash.into(),
            is_active: true,
            language: None,
            roles: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_role(mut self, role: RoleRef) -> Self {
        self.roles.push(role);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Case-insensitive username lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>>;
}

/// In-process directory, keyed by lowercased username
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, UserAccount>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: UserAccount) {
        self.users.insert(user.username.to_lowercase(), user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.get(&username.to_lowercase()).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.iter().find(|u| u.id == id).map(|u| u.value().clone()))
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: Option<String>,
    password_hash: String,
    is_active: bool,
    language: Option<String>,
}

/// Directory over the `users`, `roles` and `user_roles` tables
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_roles(&self, row: Option<UserRow>) -> Result<Option<UserAccount>> {
        let Some(row) = row else {
            return Ok(None);
        };

        let roles = sqlx::query_as::<_, RoleRef>(
            r#"SELECT r."id", r."code" FROM "roles" r
               JOIN "user_roles" ur ON ur."role_id" = r."id"
               WHERE ur."user_id" = $1 AND r."is_deleted" = FALSE
               ORDER BY r."id""#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserAccount {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            is_active: row.is_active,
            language: row.language,
            roles,
        }))
    }
}

const USER_COLUMNS: &str = r#""id", "username", "email", "password_hash", "is_active", "language""#;

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let sql = format!(
            r#"SELECT {} FROM "users" WHERE LOWER("username") = LOWER($1) AND "is_deleted" = FALSE"#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        self.with_roles(row).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        let sql = format!(r#"SELECT {} FROM "users" WHERE "id" = $1 AND "is_deleted" = FALSE"#, USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.with_roles(row).await
    }
}
