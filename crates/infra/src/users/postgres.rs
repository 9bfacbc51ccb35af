//! Postgres-backed user repository.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Duplicate(field)`, field taken from the violated index |
//! | Database (other) | Any other | `Backend` |
//! | Other | N/A | `Backend` |
//!
//! Updates run inside a transaction (`SELECT ... FOR UPDATE`, patch, `UPDATE`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use warden_core::{IdpUid, RoleId, UserId, UserPatch, UserRecord};

use super::{RepositoryError, UserRepository};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          UUID PRIMARY KEY,
        idp_uid     UUID,
        user_name   TEXT NOT NULL,
        first_name  TEXT NOT NULL,
        last_name   TEXT NOT NULL,
        email       TEXT NOT NULL,
        roles       TEXT[] NOT NULL DEFAULT '{}',
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_user_name_lower_idx ON users (lower(user_name))",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_idx ON users (email)",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_idp_uid_idx ON users (idp_uid)",
];

const SELECT_COLUMNS: &str =
    "SELECT id, idp_uid, user_name, first_name, last_name, email, roles, created_at, updated_at FROM users";

#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let field = match db_err.constraint() {
                    Some("users_user_name_lower_idx") => "user_name",
                    Some("users_email_idx") => "email",
                    Some("users_idp_uid_idx") => "idp_uid",
                    _ => "id",
                };
                return RepositoryError::Duplicate(field.to_string());
            }
            RepositoryError::Backend(format!("database error in {operation}: {}", db_err.message()))
        }
        other => RepositoryError::Backend(format!("{operation}: {other}")),
    }
}

fn row_to_record(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let idp_uid: Option<Uuid> = row.try_get("idp_uid")?;
    let roles: Vec<String> = row.try_get("roles")?;
    Ok(UserRecord {
        id: UserId::from_uuid(row.try_get("id")?),
        idp_uid: idp_uid.map(IdpUid::from_uuid),
        user_name: row.try_get("user_name")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        roles: roles.into_iter().map(RoleId::new).collect(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn role_strings(record: &UserRecord) -> Vec<String> {
    record.roles.iter().map(|r| r.as_str().to_string()).collect()
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `users` table and its unique indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_optional(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref()
            .map(row_to_record)
            .transpose()
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, record), fields(user_id = %record.id), err)]
    async fn insert(&self, record: UserRecord) -> Result<UserRecord, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, idp_uid, user_name, first_name, last_name, email, roles, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.idp_uid.map(Uuid::from))
        .bind(record.user_name.to_lowercase())
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(role_strings(&record))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        self.fetch_optional("find_by_id", sqlx::query(&sql).bind(id.as_uuid()))
            .await
    }

    async fn find_by_user_name(&self, user_name: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE lower(user_name) = $1");
        self.fetch_optional("find_by_user_name", sqlx::query(&sql).bind(user_name.to_lowercase()))
            .await
    }

    async fn find_by_idp_uid(&self, uid: IdpUid) -> Result<Option<UserRecord>, RepositoryError> {
        let sql = format!("{SELECT_COLUMNS} WHERE idp_uid = $1");
        self.fetch_optional("find_by_idp_uid", sqlx::query(&sql).bind(uid.as_uuid()))
            .await
    }

    async fn user_name_exists(&self, user_name: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(user_name) = $1 AND ($2::uuid IS NULL OR id <> $2)) AS found",
        )
        .bind(user_name.to_lowercase())
        .bind(exclude.map(Uuid::from))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_name_exists", e))?;
        row.try_get("found")
            .map_err(|e| map_sqlx_error("user_name_exists", e))
    }

    async fn email_exists(&self, email: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)) AS found",
        )
        .bind(email)
        .bind(exclude.map(Uuid::from))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("email_exists", e))?;
        row.try_get("found")
            .map_err(|e| map_sqlx_error("email_exists", e))
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update(&self, id: UserId, patch: &UserPatch, now: DateTime<Utc>) -> Result<UserRecord, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update", e))?
            .ok_or(RepositoryError::NotFound)?;
        let mut record = row_to_record(&row).map_err(|e| map_sqlx_error("update", e))?;
        patch.apply(&mut record, now);

        sqlx::query(
            r#"
            UPDATE users
            SET user_name = $2, first_name = $3, last_name = $4, email = $5, roles = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&record.user_name)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.email)
        .bind(role_strings(&record))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(record)
    }

    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }
}
