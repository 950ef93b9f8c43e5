//! Data Access Layer
//!
//! This module contains all the functions for interacting with the PostgreSQL database.
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate builds
//! without a live database; the schema lives in `./migrations`.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Message, MessageRole, Session, SessionStatus, StudyPlanRecord};

const SESSION_COLUMNS: &str = "id, user_id, topic, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";
const STUDY_PLAN_COLUMNS: &str = "id, session_id, file_path, plan, created_at";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates a new session and stores the tutor's welcome message in one transaction.
    pub async fn create_session(
        &self,
        user_id: &str,
        topic: Option<&str>,
        welcome_message: &str,
    ) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (user_id, topic) VALUES ($1, $2) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(topic)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO messages (session_id, role, content) VALUES ($1, $2, $3)")
            .bind(session.id)
            .bind(MessageRole::Ai)
            .bind(welcome_message)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(session)
    }

    /// Retrieves a single session by its ID, scoped to a specific user.
    pub async fn get_session(&self, session_id: Uuid, user_id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND user_id = $2"
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Lists all sessions for a given user, ordered by most recent.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Adds a new message to a session's conversation history.
    pub async fn add_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (session_id, role, content) VALUES ($1, $2, $3) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(session_id)
        .bind(role)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    /// Retrieves the full message history for a session, ordered chronologically.
    pub async fn get_session_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Records a study plan saved during the session.
    pub async fn save_study_plan(
        &self,
        session_id: Uuid,
        file_path: &str,
        plan: &serde_json::Value,
    ) -> Result<StudyPlanRecord> {
        let record = sqlx::query_as::<_, StudyPlanRecord>(&format!(
            "INSERT INTO study_plans (session_id, file_path, plan) VALUES ($1, $2, $3) RETURNING {STUDY_PLAN_COLUMNS}"
        ))
        .bind(session_id)
        .bind(file_path)
        .bind(plan)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    /// Retrieves the most recently saved study plan for a session.
    pub async fn get_latest_study_plan(&self, session_id: Uuid) -> Result<Option<StudyPlanRecord>> {
        let record = sqlx::query_as::<_, StudyPlanRecord>(&format!(
            "SELECT {STUDY_PLAN_COLUMNS} FROM study_plans WHERE session_id = $1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Updates the status of a session (e.g., from 'active' to 'ended').
    pub async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
    ) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "UPDATE sessions SET status = $1, updated_at = now() WHERE id = $2 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(status)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }
}
