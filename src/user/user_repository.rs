use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use uuid::Uuid;

use super::user_models::{NewUser, Role, User};
use crate::error::{AppError, FieldErrors, Result};

/// Read-mostly directory of students, teachers and admins.
pub trait UserRepository: Clone + Send + Sync + 'static {
    /// `None` when the username is already registered.
    fn create(&self, user: &NewUser) -> impl Future<Output = Result<Option<User>>> + Send;

    fn get_user_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<User>>> + Send;

    fn find_by_username(&self, username: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    fn list_teachers(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// Every account, for the admin directory.
    fn list_all(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// Overwrites the editable profile, credential and account status of an
    /// existing user. `None` when the user is gone; a username clash is a
    /// validation error on `username`.
    fn update(&self, user: &User) -> impl Future<Output = Result<Option<User>>> + Send;
}

pub(crate) fn username_taken() -> AppError {
    AppError::Validation(FieldErrors::single("username", "Username is already taken"))
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: Option<String>,
    role: String,
    first_name: String,
    last_name: String,
    department: Option<String>,
    grade_level: Option<String>,
    account_status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = row.role.parse().map_err(|e| {
            tracing::error!("Bad user row {}: {}", row.id, e);
            AppError::InternalError
        })?;
        let account_status = row.account_status.parse().map_err(|e| {
            tracing::error!("Bad user row {}: {}", row.id, e);
            AppError::InternalError
        })?;

        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
            first_name: row.first_name,
            last_name: row.last_name,
            department: row.department,
            grade_level: row.grade_level,
            account_status,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for PgUserRepository {
    async fn create(&self, user: &NewUser) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, username, password_hash, role, first_name, last_name, department, grade_level)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (username) DO NOTHING
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.department)
        .bind(&user.grade_level)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn list_teachers(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE role = $1 ORDER BY last_name, first_name",
        )
        .bind(Role::Teacher.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY role, last_name, first_name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn update(&self, user: &User) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users
             SET username = $2, password_hash = $3, first_name = $4, last_name = $5,
                 department = $6, grade_level = $7, account_status = $8
             WHERE id = $1
             RETURNING *",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.department)
        .bind(&user.grade_level)
        .bind(user.account_status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => username_taken(),
            e => AppError::Database(e),
        })?;

        row.map(User::try_from).transpose()
    }
}
