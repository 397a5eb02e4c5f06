use super::SessionState;
use crate::error::{Result, RouterError};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;

/// Durable per-session storage backing the coordinator.
///
/// Sessions are stored as one JSON blob per `session_id`, loaded at the
/// start of request handling and saved at the end. When multiple workers
/// run behind a load balancer, the hosting environment must guarantee a
/// single writer per session at a time; this store does not serialize
/// writers itself.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // An in-memory database lives inside a single connection, so the
        // pool must not hand out a second one.
        let max_connections = if db_path.to_string_lossy().contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&db_path)
                    .create_if_missing(true),
            )
            .await
            .map_err(RouterError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(RouterError::from)?;

        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(PathBuf::from(":memory:")).await
    }

    pub async fn save(&self, session: &SessionState) -> Result<()> {
        let data = serde_json::to_string(session).map_err(RouterError::from)?;
        let updated_at = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions (session_id, data, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&session.session_id)
        .bind(&data)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(RouterError::from)?;

        Ok(())
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT data FROM sessions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RouterError::from)?;

        match row {
            Some((data,)) => {
                let session: SessionState =
                    serde_json::from_str(&data).map_err(RouterError::from)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Loads the session if it exists, otherwise starts a fresh record.
    pub async fn load_or_create(&self, session_id: &str) -> Result<SessionState> {
        Ok(self
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id)))
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(RouterError::from)?;
        Ok(())
    }
}
