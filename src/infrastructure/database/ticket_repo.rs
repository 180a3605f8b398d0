//! Ticket persistence with deduplication and auto-resolution.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ticket::{Severity, Ticket, TicketStatus, Violation};
use crate::infrastructure::database::utils::{parse_datetime, parse_datetime_opt};

/// SQLite-backed ticket store.
///
/// Owns the dedup invariant: at most one non-resolved ticket per
/// violation key. Single-writer safe; the monitor is the sole writer of
/// tick-driven transitions.
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_ticket(row: &SqliteRow) -> DomainResult<Ticket> {
        let severity_raw: String = row.get("severity");
        let status_raw: String = row.get("status");
        let metric_snapshot = row
            .get::<Option<String>, _>("metric_snapshot")
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Ticket {
            id: row.get("id"),
            violation_key: row.get("violation_key"),
            invariant_name: row.get("invariant_name"),
            entity_id: row.get("entity_id"),
            message: row.get("message"),
            severity: Severity::from_str(&severity_raw).unwrap_or_default(),
            first_seen_at: parse_datetime(row.get::<String, _>("first_seen_at").as_str())?,
            last_seen_at: parse_datetime(row.get::<String, _>("last_seen_at").as_str())?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str())?,
            resolved_at: parse_datetime_opt(row.get::<Option<String>, _>("resolved_at").as_deref())?,
            status: TicketStatus::from_str(&status_raw).ok_or_else(|| {
                DomainError::Serialization(format!("unknown ticket status '{status_raw}'"))
            })?,
            held: row.get::<i64, _>("held") != 0,
            occurrence_count: row.get("occurrence_count"),
            batch_key: row.get("batch_key"),
            metric_snapshot,
            diagnosis: row.get("diagnosis"),
            subject_context: row.get("subject_context"),
        })
    }

    /// Create a new ticket or update the open ticket with the same
    /// violation key. Atomic: the lookup and write run in one transaction.
    ///
    /// On re-detection the ticket's `last_seen_at`, `occurrence_count`,
    /// and `message` are bumped. A `diagnosed` ticket that re-fires
    /// reverts to `open` with its diagnosis and hold cleared, so the
    /// agent retries with fresh context.
    pub async fn create_or_update(
        &self,
        violation: &Violation,
        metric_snapshot: Option<&serde_json::Value>,
        batch_key: Option<&str>,
        subject_context: Option<&str>,
    ) -> DomainResult<Ticket> {
        let key = violation.violation_key();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, status FROM tickets WHERE violation_key = ? AND status != 'resolved'",
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        let ticket_id = if let Some((id, status)) = existing {
            if status == "diagnosed" {
                sqlx::query(
                    "UPDATE tickets SET
                        last_seen_at = ?,
                        updated_at = ?,
                        occurrence_count = occurrence_count + 1,
                        message = ?,
                        status = 'open',
                        held = 0,
                        diagnosis = NULL
                     WHERE id = ?",
                )
                .bind(&now)
                .bind(&now)
                .bind(&violation.message)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                debug!(ticket_id = id, key = %key, "re-opened diagnosed ticket");
            } else {
                sqlx::query(
                    "UPDATE tickets SET
                        last_seen_at = ?,
                        updated_at = ?,
                        occurrence_count = occurrence_count + 1,
                        message = ?
                     WHERE id = ?",
                )
                .bind(&now)
                .bind(&now)
                .bind(&violation.message)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            id
        } else {
            let snapshot_json = metric_snapshot.map(serde_json::to_string).transpose()?;
            let result = sqlx::query(
                "INSERT INTO tickets (
                    violation_key, invariant_name, entity_id, message, severity,
                    first_seen_at, last_seen_at, created_at, updated_at,
                    batch_key, metric_snapshot, subject_context
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&key)
            .bind(&violation.invariant_name)
            .bind(&violation.entity_id)
            .bind(&violation.message)
            .bind(violation.severity.as_str())
            .bind(violation.first_seen.to_rfc3339())
            .bind(&now)
            .bind(&now)
            .bind(&now)
            .bind(batch_key)
            .bind(snapshot_json)
            .bind(subject_context)
            .execute(&mut *tx)
            .await?;
            result.last_insert_rowid()
        };

        tx.commit().await?;

        self.get(ticket_id).await
    }

    pub async fn get(&self, ticket_id: i64) -> DomainResult<Ticket> {
        let row = sqlx::query("SELECT * FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DomainError::TicketNotFound(ticket_id))?;
        Self::row_to_ticket(&row)
    }

    /// List tickets, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<TicketStatus>) -> DomainResult<Vec<Ticket>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM tickets WHERE status = ? ORDER BY created_at DESC, id DESC")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM tickets ORDER BY created_at DESC, id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_ticket).collect()
    }

    /// Tickets sharing an invariant (and optionally entity) with the
    /// given ticket, for diagnosis context. Excludes the ticket itself.
    pub async fn list_similar(&self, ticket: &Ticket, limit: usize) -> DomainResult<Vec<Ticket>> {
        let rows = sqlx::query(
            "SELECT * FROM tickets
             WHERE id != ? AND (invariant_name = ? OR (entity_id IS NOT NULL AND entity_id = ?))
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(ticket.id)
        .bind(&ticket.invariant_name)
        .bind(&ticket.entity_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_ticket).collect()
    }

    /// Resolve a ticket. No-op when the ticket is held.
    pub async fn resolve(&self, ticket_id: i64) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE tickets SET status = 'resolved', resolved_at = ?, updated_at = ?
             WHERE id = ? AND held = 0",
        )
        .bind(&now)
        .bind(&now)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish missing from held for the caller's error message.
            self.get(ticket_id).await?;
        }
        Ok(())
    }

    /// Set the hold flag: held tickets are never auto-resolved.
    pub async fn hold(&self, ticket_id: i64) -> DomainResult<()> {
        self.set_held(ticket_id, true).await
    }

    pub async fn unhold(&self, ticket_id: i64) -> DomainResult<()> {
        self.set_held(ticket_id, false).await
    }

    async fn set_held(&self, ticket_id: i64, held: bool) -> DomainResult<()> {
        let result = sqlx::query("UPDATE tickets SET held = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(held))
            .bind(Utc::now().to_rfc3339())
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TicketNotFound(ticket_id));
        }
        Ok(())
    }

    /// Store the agent's diagnosis and transition to `diagnosed`.
    pub async fn update_diagnosis(&self, ticket_id: i64, diagnosis: &str) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE tickets SET diagnosis = ?, status = 'diagnosed', updated_at = ? WHERE id = ?",
        )
        .bind(diagnosis)
        .bind(Utc::now().to_rfc3339())
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TicketNotFound(ticket_id));
        }
        Ok(())
    }

    /// Resolve every non-held, non-resolved ticket whose violation key is
    /// absent from the current set. Returns the number resolved.
    pub async fn auto_resolve_cleared(
        &self,
        current_keys: &HashSet<String>,
    ) -> DomainResult<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let open: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, violation_key FROM tickets WHERE status != 'resolved' AND held = 0",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut resolved = 0u64;
        for (id, key) in open {
            if !current_keys.contains(&key) {
                sqlx::query(
                    "UPDATE tickets SET status = 'resolved', resolved_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&now)
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                resolved += 1;
            }
        }

        tx.commit().await?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::DatabaseConnection;
    use chrono::Utc;

    async fn setup() -> TicketRepository {
        let db = DatabaseConnection::new("sqlite::memory:")
            .await
            .expect("failed to create connection");
        db.migrate().await.expect("failed to run migrations");
        TicketRepository::new(db.pool().clone())
    }

    fn violation(invariant: &str, entity: Option<&str>, message: &str) -> Violation {
        Violation {
            invariant_name: invariant.to_string(),
            message: message.to_string(),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            entity_id: entity.map(String::from),
            severity: Severity::Warning,
        }
    }

    #[tokio::test]
    async fn create_then_update_deduplicates() {
        let repo = setup().await;
        let v = violation("over_limit", Some("k1"), "count=20 limit=10");

        let first = repo.create_or_update(&v, None, Some("tick-1"), None).await.unwrap();
        let second = repo.create_or_update(&v, None, Some("tick-2"), None).await.unwrap();
        let third = repo.create_or_update(&v, None, Some("tick-3"), None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert_eq!(third.occurrence_count, 3);

        let open = repo.list(Some(TicketStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn distinct_entities_get_distinct_tickets() {
        let repo = setup().await;
        repo.create_or_update(&violation("node_down", Some("n1"), "n1 down"), None, None, None)
            .await
            .unwrap();
        repo.create_or_update(&violation("node_down", Some("n2"), "n2 down"), None, None, None)
            .await
            .unwrap();

        let open = repo.list(Some(TicketStatus::Open)).await.unwrap();
        assert_eq!(open.len(), 2);
    }

    #[tokio::test]
    async fn diagnosed_ticket_reopens_on_refire() {
        let repo = setup().await;
        let v = violation("high_latency", Some("n1"), "p99 150ms");
        let ticket = repo.create_or_update(&v, None, None, None).await.unwrap();

        repo.update_diagnosis(ticket.id, "# Diagnosis\n\nOverload.").await.unwrap();
        repo.hold(ticket.id).await.unwrap();

        let refired = repo.create_or_update(&v, None, None, None).await.unwrap();
        assert_eq!(refired.id, ticket.id);
        assert_eq!(refired.status, TicketStatus::Open);
        assert!(refired.diagnosis.is_none());
        assert!(!refired.held);
    }

    #[tokio::test]
    async fn auto_resolve_skips_held_and_present_keys() {
        let repo = setup().await;
        let gone = repo
            .create_or_update(&violation("node_down", Some("n1"), "n1 down"), None, None, None)
            .await
            .unwrap();
        let still = repo
            .create_or_update(&violation("node_down", Some("n2"), "n2 down"), None, None, None)
            .await
            .unwrap();
        let held = repo
            .create_or_update(&violation("node_down", Some("n3"), "n3 down"), None, None, None)
            .await
            .unwrap();
        repo.hold(held.id).await.unwrap();

        let mut current = HashSet::new();
        current.insert("node_down:n2".to_string());

        let count = repo.auto_resolve_cleared(&current).await.unwrap();
        assert_eq!(count, 1);

        assert_eq!(repo.get(gone.id).await.unwrap().status, TicketStatus::Resolved);
        assert_eq!(repo.get(still.id).await.unwrap().status, TicketStatus::Open);
        assert_eq!(repo.get(held.id).await.unwrap().status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn resolve_respects_hold_until_unheld() {
        let repo = setup().await;
        let ticket = repo
            .create_or_update(&violation("node_down", Some("n1"), "n1 down"), None, None, None)
            .await
            .unwrap();

        repo.hold(ticket.id).await.unwrap();
        repo.resolve(ticket.id).await.unwrap();
        assert_eq!(repo.get(ticket.id).await.unwrap().status, TicketStatus::Open);

        repo.unhold(ticket.id).await.unwrap();
        repo.resolve(ticket.id).await.unwrap();
        let resolved = repo.get(ticket.id).await.unwrap();
        assert_eq!(resolved.status, TicketStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn resolved_key_can_open_a_new_ticket() {
        let repo = setup().await;
        let v = violation("node_down", Some("n1"), "n1 down");
        let first = repo.create_or_update(&v, None, None, None).await.unwrap();
        repo.resolve(first.id).await.unwrap();

        let second = repo.create_or_update(&v, None, None, None).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.occurrence_count, 1);
    }

    #[tokio::test]
    async fn metric_snapshot_round_trips() {
        let repo = setup().await;
        let snapshot = serde_json::json!({"latency_p99_ms": 150.0, "node": "n1"});
        let ticket = repo
            .create_or_update(
                &violation("high_latency", Some("n1"), "p99 150ms"),
                Some(&snapshot),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(ticket.metric_snapshot, Some(snapshot));
    }
}
