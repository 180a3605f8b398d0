//! Append-only audit log persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::audit::{AuditEvent, AuditEventType};
use crate::infrastructure::database::utils::parse_datetime;

/// SQLite-backed audit log. Append-only: there is no update or delete.
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &SqliteRow) -> DomainResult<AuditEvent> {
        let event_type_raw: String = row.get("event_type");
        let event_data = row
            .get::<Option<String>, _>("event_data")
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(AuditEvent {
            id: row.get("id"),
            proposal_id: row.get("proposal_id"),
            event_type: AuditEventType::from_str(&event_type_raw).ok_or_else(|| {
                DomainError::Serialization(format!("unknown audit event type '{event_type_raw}'"))
            })?,
            event_data,
            actor: row.get("actor"),
            timestamp: parse_datetime(row.get::<String, _>("timestamp").as_str())?,
        })
    }

    /// Append one event. `event_data` must already be redacted.
    pub async fn append(
        &self,
        proposal_id: Option<i64>,
        event_type: AuditEventType,
        event_data: Option<&serde_json::Value>,
        actor: &str,
    ) -> DomainResult<()> {
        let data_json = event_data.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO action_audit_log (proposal_id, event_type, event_data, actor, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(proposal_id)
        .bind(event_type.as_str())
        .bind(data_json)
        .bind(actor)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Query events, newest first, with optional filters.
    pub async fn list(
        &self,
        proposal_id: Option<i64>,
        event_type: Option<AuditEventType>,
        limit: i64,
    ) -> DomainResult<Vec<AuditEvent>> {
        let mut conditions = Vec::new();
        if proposal_id.is_some() {
            conditions.push("proposal_id = ?");
        }
        if event_type.is_some() {
            conditions.push("event_type = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT * FROM action_audit_log {where_clause} ORDER BY timestamp DESC, id DESC LIMIT ?"
        );

        let mut q = sqlx::query(&query);
        if let Some(pid) = proposal_id {
            q = q.bind(pid);
        }
        if let Some(et) = event_type {
            q = q.bind(et.as_str());
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_event).collect()
    }

    /// Events within a time window, oldest first. Used by the eval
    /// harness to extract the commands a trial executed.
    pub async fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM action_audit_log WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(start.to_rfc3339())
        .bind(end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::DatabaseConnection;
    use serde_json::json;

    async fn setup() -> AuditLogRepository {
        let db = DatabaseConnection::new("sqlite::memory:")
            .await
            .expect("failed to create connection");
        db.migrate().await.expect("failed to run migrations");
        AuditLogRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn append_and_filter() {
        let repo = setup().await;
        repo.append(Some(1), AuditEventType::Proposed, Some(&json!({"action_name": "wait"})), "agent")
            .await
            .unwrap();
        repo.append(Some(1), AuditEventType::Validated, None, "system").await.unwrap();
        repo.append(None, AuditEventType::KillSwitch, Some(&json!({"cancelled_count": 2})), "user")
            .await
            .unwrap();

        let all = repo.list(None, None, 100).await.unwrap();
        assert_eq!(all.len(), 3);

        let for_proposal = repo.list(Some(1), None, 100).await.unwrap();
        assert_eq!(for_proposal.len(), 2);

        let kills = repo.list(None, Some(AuditEventType::KillSwitch), 100).await.unwrap();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].actor, "user");
        assert!(kills[0].proposal_id.is_none());
    }

    #[tokio::test]
    async fn time_window_query_is_ordered() {
        let repo = setup().await;
        let before = Utc::now() - chrono::Duration::seconds(5);
        repo.append(Some(1), AuditEventType::Executing, None, "system").await.unwrap();
        repo.append(Some(1), AuditEventType::Completed, None, "system").await.unwrap();
        let after = Utc::now() + chrono::Duration::seconds(5);

        let window = repo.list_between(before, after).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].event_type, AuditEventType::Executing);
        assert_eq!(window[1].event_type, AuditEventType::Completed);

        let empty = repo
            .list_between(before - chrono::Duration::hours(2), before)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
