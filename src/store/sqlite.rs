//! SQLite FamilyStore backed by sqlx
//!
//! Ids and timestamps are stored as TEXT (RFC 3339 with microseconds, UTC),
//! which keeps lexical order equal to chronological order. Suggestion
//! payloads are stored as JSON text.

use super::models::*;
use super::traits::FamilyStore;
use crate::chat::types::{ChatMessage, Party};
use crate::suggestions::models::{Suggestion, SuggestionKind, SuggestionStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    ///
    /// `sqlite::memory:` is supported; it is pinned to a single connection so
    /// every query sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        info!(database_url, "SQLite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS children (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                age INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                party_type TEXT NOT NULL,
                party_id TEXT NOT NULL,
                role TEXT NOT NULL,
                message_type TEXT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_party ON chat_messages (party_type, party_id, created_at)",
            r#"
            CREATE TABLE IF NOT EXISTS suggestions (
                id TEXT PRIMARY KEY,
                child_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                created_at TEXT NOT NULL,
                accepted_at TEXT,
                resolved_at TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_suggestions_child ON suggestions (child_id, status)",
            r#"
            CREATE TABLE IF NOT EXISTS chore_templates (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                point_value INTEGER NOT NULL,
                icon TEXT NOT NULL,
                category TEXT NOT NULL,
                source_suggestion_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS learning_goals (
                id TEXT PRIMARY KEY,
                child_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                rationale TEXT,
                target_units INTEGER NOT NULL,
                points_per_unit INTEGER NOT NULL,
                source_suggestion_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chore_assignments (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                child_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to run schema migration")?;
        }
        Ok(())
    }

    /// Current status of a suggestion, used to explain a no-op transition
    async fn status_of(&self, id: Uuid) -> Result<TransitionOutcome> {
        let row = sqlx::query("SELECT status FROM suggestions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load suggestion status")?;
        match row {
            None => Ok(TransitionOutcome::NotFound),
            Some(row) => {
                let status: String = row.try_get("status")?;
                Ok(TransitionOutcome::AlreadyResolved(parse_enum(&status)?))
            }
        }
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid stored id: {}", raw))
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|e| anyhow!(e))
}

fn child_from_row(row: &SqliteRow) -> Result<ChildProfile> {
    let age: Option<i64> = row.try_get("age")?;
    Ok(ChildProfile {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        age: age.and_then(|a| u32::try_from(a).ok()),
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    Ok(ChatMessage {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        party: Party::new(
            parse_enum(&row.try_get::<String, _>("party_type")?)?,
            row.try_get::<String, _>("party_id")?,
        ),
        role: parse_enum(&row.try_get::<String, _>("role")?)?,
        message_type: row.try_get("message_type")?,
        content: row.try_get("content")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn suggestion_from_row(row: &SqliteRow) -> Result<Suggestion> {
    let payload: String = row.try_get("payload")?;
    Ok(Suggestion {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        child_id: row.try_get("child_id")?,
        kind: parse_enum(&row.try_get::<String, _>("kind")?)?,
        payload: serde_json::from_str(&payload).context("Invalid stored suggestion payload")?,
        status: parse_enum(&row.try_get::<String, _>("status")?)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        accepted_at: parse_opt_ts(row.try_get("accepted_at")?)?,
        resolved_at: parse_opt_ts(row.try_get("resolved_at")?)?,
    })
}

fn template_from_row(row: &SqliteRow) -> Result<ChoreTemplate> {
    let source: Option<String> = row.try_get("source_suggestion_id")?;
    Ok(ChoreTemplate {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        point_value: row.try_get("point_value")?,
        icon: row.try_get("icon")?,
        category: row.try_get("category")?,
        source_suggestion_id: source.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn goal_from_row(row: &SqliteRow) -> Result<LearningGoal> {
    let source: Option<String> = row.try_get("source_suggestion_id")?;
    Ok(LearningGoal {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        child_id: row.try_get("child_id")?,
        subject: row.try_get("subject")?,
        rationale: row.try_get("rationale")?,
        target_units: row.try_get("target_units")?,
        points_per_unit: row.try_get("points_per_unit")?,
        source_suggestion_id: source.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<ChoreAssignment> {
    Ok(ChoreAssignment {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        template_id: parse_uuid(&row.try_get::<String, _>("template_id")?)?,
        child_id: row.try_get("child_id")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[async_trait]
impl FamilyStore for SqliteStore {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("SQLite health check failed")?;
        Ok(())
    }

    async fn upsert_child(&self, child: &ChildProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO children (id, parent_id, name, age, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                name = excluded.name,
                age = excluded.age
            "#,
        )
        .bind(&child.id)
        .bind(&child.parent_id)
        .bind(&child.name)
        .bind(child.age.map(i64::from))
        .bind(fmt_ts(&child.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to upsert child")?;
        Ok(())
    }

    async fn get_child(&self, id: &str) -> Result<Option<ChildProfile>> {
        let row = sqlx::query("SELECT * FROM children WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load child")?;
        row.as_ref().map(child_from_row).transpose()
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, party_type, party_id, role, message_type, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.party.party_type.as_str())
        .bind(&message.party.party_id)
        .bind(message.role.as_str())
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(fmt_ts(&message.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to append chat message")?;
        Ok(())
    }

    async fn recent_messages(&self, party: &Party, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM chat_messages
            WHERE party_type = ? AND party_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(party.party_type.as_str())
        .bind(&party.party_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load chat history")?;
        rows.iter().map(message_from_row).collect()
    }

    async fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for suggestion in suggestions {
            sqlx::query(
                r#"
                INSERT INTO suggestions (id, child_id, kind, payload, status, created_at, accepted_at, resolved_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(suggestion.id.to_string())
            .bind(&suggestion.child_id)
            .bind(suggestion.kind.as_str())
            .bind(suggestion.payload.to_string())
            .bind(suggestion.status.as_str())
            .bind(fmt_ts(&suggestion.created_at))
            .bind(suggestion.accepted_at.as_ref().map(fmt_ts))
            .bind(suggestion.resolved_at.as_ref().map(fmt_ts))
            .execute(&mut *tx)
            .await
            .context("Failed to insert suggestion")?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<Suggestion>> {
        let row = sqlx::query("SELECT * FROM suggestions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load suggestion")?;
        row.as_ref().map(suggestion_from_row).transpose()
    }

    async fn list_suggestions(
        &self,
        child_id: &str,
        status: Option<SuggestionStatus>,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Suggestion>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM suggestions
            WHERE child_id = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR kind = ?)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(child_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list suggestions")?;
        rows.iter().map(suggestion_from_row).collect()
    }

    async fn commit_acceptance(
        &self,
        id: Uuid,
        materialization: &Materialization,
        accepted_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;
        let accepted = fmt_ts(&accepted_at);

        let updated = sqlx::query(
            r#"
            UPDATE suggestions
            SET status = 'accepted', accepted_at = ?, resolved_at = ?
            WHERE id = ? AND status = 'new'
            "#,
        )
        .bind(&accepted)
        .bind(&accepted)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to mark suggestion accepted")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return self.status_of(id).await;
        }

        match &materialization.entity {
            MaterializedEntity::ChoreTemplate(t) => {
                sqlx::query(
                    r#"
                    INSERT INTO chore_templates
                        (id, parent_id, name, description, point_value, icon, category, source_suggestion_id, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(t.id.to_string())
                .bind(&t.parent_id)
                .bind(&t.name)
                .bind(&t.description)
                .bind(t.point_value)
                .bind(&t.icon)
                .bind(&t.category)
                .bind(t.source_suggestion_id.map(|s| s.to_string()))
                .bind(fmt_ts(&t.created_at))
                .execute(&mut *tx)
                .await
                .context("Failed to insert chore template")?;
            }
            MaterializedEntity::LearningGoal(g) => {
                sqlx::query(
                    r#"
                    INSERT INTO learning_goals
                        (id, child_id, subject, rationale, target_units, points_per_unit, source_suggestion_id, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(g.id.to_string())
                .bind(&g.child_id)
                .bind(&g.subject)
                .bind(&g.rationale)
                .bind(g.target_units)
                .bind(g.points_per_unit)
                .bind(g.source_suggestion_id.map(|s| s.to_string()))
                .bind(fmt_ts(&g.created_at))
                .execute(&mut *tx)
                .await
                .context("Failed to insert learning goal")?;
            }
        }

        if let Some(a) = &materialization.assignment {
            sqlx::query(
                "INSERT INTO chore_assignments (id, template_id, child_id, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(a.id.to_string())
            .bind(a.template_id.to_string())
            .bind(&a.child_id)
            .bind(fmt_ts(&a.created_at))
            .execute(&mut *tx)
            .await
            .context("Failed to insert chore assignment")?;
        }

        tx.commit().await.context("Failed to commit acceptance")?;
        Ok(TransitionOutcome::Applied)
    }

    async fn mark_dismissed(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let updated = sqlx::query(
            "UPDATE suggestions SET status = 'dismissed', resolved_at = ? WHERE id = ? AND status = 'new'",
        )
        .bind(fmt_ts(&resolved_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to mark suggestion dismissed")?;

        if updated.rows_affected() == 0 {
            return self.status_of(id).await;
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn get_chore_template(&self, id: Uuid) -> Result<Option<ChoreTemplate>> {
        let row = sqlx::query("SELECT * FROM chore_templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load chore template")?;
        row.as_ref().map(template_from_row).transpose()
    }

    async fn list_chore_templates(&self, parent_id: &str) -> Result<Vec<ChoreTemplate>> {
        let rows = sqlx::query(
            "SELECT * FROM chore_templates WHERE parent_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list chore templates")?;
        rows.iter().map(template_from_row).collect()
    }

    async fn list_learning_goals(&self, child_id: &str) -> Result<Vec<LearningGoal>> {
        let rows = sqlx::query(
            "SELECT * FROM learning_goals WHERE child_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(child_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list learning goals")?;
        rows.iter().map(goal_from_row).collect()
    }

    async fn list_assignments(&self, child_id: &str) -> Result<Vec<ChoreAssignment>> {
        let rows = sqlx::query(
            "SELECT * FROM chore_assignments WHERE child_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(child_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list chore assignments")?;
        rows.iter().map(assignment_from_row).collect()
    }
}
