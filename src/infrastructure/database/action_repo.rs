//! Action persistence: proposals, execution records, and workflows.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::action::{
    ActionProposal, ActionRecord, ActionStatus, ActionType, RequesterType, WorkflowProposal,
    WorkflowStatus,
};
use crate::infrastructure::database::utils::{parse_datetime, parse_datetime_opt};

/// Fields needed to insert a new proposal. The repository assigns the id
/// and the initial `proposed` status.
pub struct NewProposal {
    pub ticket_id: Option<i64>,
    pub action_name: String,
    pub action_type: ActionType,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub reason: String,
    pub proposed_by: String,
    pub requester_id: String,
    pub requester_type: RequesterType,
    pub agent_id: Option<String>,
    pub workflow_id: Option<i64>,
    pub execution_order: i64,
    pub depends_on_proposal_id: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: i64,
}

/// SQLite-backed action store.
///
/// The dispatcher exclusively owns proposal status transitions; the
/// repository enforces transition validity so an out-of-order write is a
/// bug surfaced loudly rather than silent corruption.
pub struct ActionRepository {
    pool: SqlitePool,
}

impl ActionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_proposal(row: &SqliteRow) -> DomainResult<ActionProposal> {
        let action_type_raw: String = row.get("action_type");
        let status_raw: String = row.get("status");
        let requester_type_raw: String = row.get("requester_type");
        let parameters: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(row.get::<String, _>("parameters").as_str())?;

        Ok(ActionProposal {
            id: row.get("id"),
            ticket_id: row.get("ticket_id"),
            action_name: row.get("action_name"),
            action_type: ActionType::from_str(&action_type_raw).ok_or_else(|| {
                DomainError::Serialization(format!("unknown action type '{action_type_raw}'"))
            })?,
            parameters,
            reason: row.get("reason"),
            status: ActionStatus::from_str(&status_raw).ok_or_else(|| {
                DomainError::Serialization(format!("unknown action status '{status_raw}'"))
            })?,
            proposed_at: parse_datetime(row.get::<String, _>("proposed_at").as_str())?,
            proposed_by: row.get("proposed_by"),
            requester_id: row.get("requester_id"),
            requester_type: RequesterType::from_str(&requester_type_raw).unwrap_or_default(),
            agent_id: row.get("agent_id"),
            approved_at: parse_datetime_opt(row.get::<Option<String>, _>("approved_at").as_deref())?,
            approved_by: row.get("approved_by"),
            rejected_at: parse_datetime_opt(row.get::<Option<String>, _>("rejected_at").as_deref())?,
            rejected_by: row.get("rejected_by"),
            rejection_reason: row.get("rejection_reason"),
            workflow_id: row.get("workflow_id"),
            execution_order: row.get("execution_order"),
            depends_on_proposal_id: row.get("depends_on_proposal_id"),
            scheduled_at: parse_datetime_opt(row.get::<Option<String>, _>("scheduled_at").as_deref())?,
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            next_retry_at: parse_datetime_opt(row.get::<Option<String>, _>("next_retry_at").as_deref())?,
            last_error: row.get("last_error"),
        })
    }

    fn row_to_record(row: &SqliteRow) -> DomainResult<ActionRecord> {
        let result_data = row
            .get::<Option<String>, _>("result_data")
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(ActionRecord {
            id: row.get("id"),
            proposal_id: row.get("proposal_id"),
            started_at: parse_datetime_opt(row.get::<Option<String>, _>("started_at").as_deref())?,
            completed_at: parse_datetime_opt(row.get::<Option<String>, _>("completed_at").as_deref())?,
            success: row.get::<Option<i64>, _>("success").map(|v| v != 0),
            error_message: row.get("error_message"),
            result_data,
        })
    }

    fn row_to_workflow(row: &SqliteRow) -> DomainResult<WorkflowProposal> {
        let status_raw: String = row.get("status");
        Ok(WorkflowProposal {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            ticket_id: row.get("ticket_id"),
            status: WorkflowStatus::from_str(&status_raw).ok_or_else(|| {
                DomainError::Serialization(format!("unknown workflow status '{status_raw}'"))
            })?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }

    // =========================================================================
    // Proposal operations
    // =========================================================================

    pub async fn create_proposal(&self, new: NewProposal) -> DomainResult<ActionProposal> {
        let parameters_json = serde_json::to_string(&new.parameters)?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO action_proposals (
                ticket_id, action_name, action_type, parameters, reason,
                status, proposed_at, proposed_by,
                requester_id, requester_type, agent_id,
                workflow_id, execution_order, depends_on_proposal_id,
                scheduled_at, max_retries
             ) VALUES (?, ?, ?, ?, ?, 'proposed', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.ticket_id)
        .bind(&new.action_name)
        .bind(new.action_type.as_str())
        .bind(parameters_json)
        .bind(&new.reason)
        .bind(&now)
        .bind(&new.proposed_by)
        .bind(&new.requester_id)
        .bind(new.requester_type.as_str())
        .bind(&new.agent_id)
        .bind(new.workflow_id)
        .bind(new.execution_order)
        .bind(new.depends_on_proposal_id)
        .bind(new.scheduled_at.map(|t| t.to_rfc3339()))
        .bind(new.max_retries)
        .execute(&self.pool)
        .await?;

        self.get_proposal(result.last_insert_rowid()).await
    }

    pub async fn get_proposal(&self, proposal_id: i64) -> DomainResult<ActionProposal> {
        let row = sqlx::query("SELECT * FROM action_proposals WHERE id = ?")
            .bind(proposal_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DomainError::ProposalNotFound(proposal_id))?;
        Self::row_to_proposal(&row)
    }

    pub async fn list_proposals(
        &self,
        status: Option<ActionStatus>,
    ) -> DomainResult<Vec<ActionProposal>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM action_proposals WHERE status = ? ORDER BY created_at DESC, id DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM action_proposals ORDER BY created_at DESC, id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(Self::row_to_proposal).collect()
    }

    /// Transition a proposal's status, enforcing lifecycle validity.
    pub async fn update_status(
        &self,
        proposal_id: i64,
        status: ActionStatus,
    ) -> DomainResult<()> {
        let current = self.get_proposal(proposal_id).await?.status;
        if !current.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                from: current.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let extra = match status {
            ActionStatus::Validated => ", validated_at = ?",
            ActionStatus::Cancelled => ", cancelled_at = ?",
            _ => "",
        };
        let query = format!("UPDATE action_proposals SET status = ?{extra} WHERE id = ?");
        let mut q = sqlx::query(&query).bind(status.as_str());
        if !extra.is_empty() {
            q = q.bind(&now);
        }
        q.bind(proposal_id).execute(&self.pool).await?;
        Ok(())
    }

    /// Cancel all proposals in {proposed, validated}. Used by the kill
    /// switch and by the switch-to-observe path. Returns the count.
    pub async fn cancel_all_pending(&self) -> DomainResult<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE action_proposals SET status = 'cancelled', cancelled_at = ?
             WHERE status IN ('proposed', 'validated')",
        )
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Approval operations
    // =========================================================================

    pub async fn approve_proposal(&self, proposal_id: i64, approved_by: &str) -> DomainResult<()> {
        let proposal = self.get_proposal(proposal_id).await?;
        if proposal.status != ActionStatus::Validated {
            return Err(DomainError::InvalidStateTransition {
                from: proposal.status.as_str().to_string(),
                to: "approved".to_string(),
            });
        }
        sqlx::query("UPDATE action_proposals SET approved_at = ?, approved_by = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(approved_by)
            .bind(proposal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reject a validated proposal: records who and why, then cancels it.
    pub async fn reject_proposal(
        &self,
        proposal_id: i64,
        rejected_by: &str,
        reason: &str,
    ) -> DomainResult<()> {
        let proposal = self.get_proposal(proposal_id).await?;
        if proposal.status != ActionStatus::Validated {
            return Err(DomainError::InvalidStateTransition {
                from: proposal.status.as_str().to_string(),
                to: "rejected".to_string(),
            });
        }
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE action_proposals SET
                rejected_at = ?, rejected_by = ?, rejection_reason = ?,
                status = 'cancelled', cancelled_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(rejected_by)
        .bind(reason)
        .bind(&now)
        .bind(proposal_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Scheduling and retry queues
    // =========================================================================

    /// Validated proposals whose `scheduled_at` has arrived.
    pub async fn list_due_scheduled(&self, now: DateTime<Utc>) -> DomainResult<Vec<ActionProposal>> {
        let rows = sqlx::query(
            "SELECT * FROM action_proposals
             WHERE status = 'validated' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
             ORDER BY scheduled_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_proposal).collect()
    }

    /// Failed proposals whose retry time has arrived with budget left.
    pub async fn list_retry_eligible(&self, now: DateTime<Utc>) -> DomainResult<Vec<ActionProposal>> {
        let rows = sqlx::query(
            "SELECT * FROM action_proposals
             WHERE status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= ?
               AND retry_count < max_retries
             ORDER BY next_retry_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_proposal).collect()
    }

    /// Re-arm a failed proposal for another attempt. Clears the retry
    /// timer and the scheduled time so the execution path is immediate.
    pub async fn reset_for_retry(&self, proposal_id: i64) -> DomainResult<()> {
        let current = self.get_proposal(proposal_id).await?.status;
        if current != ActionStatus::Failed {
            return Err(DomainError::InvalidStateTransition {
                from: current.as_str().to_string(),
                to: ActionStatus::Validated.as_str().to_string(),
            });
        }
        sqlx::query(
            "UPDATE action_proposals SET status = 'validated', next_retry_at = NULL, scheduled_at = NULL
             WHERE id = ?",
        )
        .bind(proposal_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Increment the retry counter and remember the error. Returns the
    /// new retry count.
    pub async fn increment_retry(&self, proposal_id: i64, error: &str) -> DomainResult<i64> {
        sqlx::query(
            "UPDATE action_proposals SET retry_count = retry_count + 1, last_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(proposal_id)
        .execute(&self.pool)
        .await?;
        Ok(self.get_proposal(proposal_id).await?.retry_count)
    }

    pub async fn set_next_retry(
        &self,
        proposal_id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        sqlx::query("UPDATE action_proposals SET next_retry_at = ? WHERE id = ?")
            .bind(next_retry_at.to_rfc3339())
            .bind(proposal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    pub async fn create_record(
        &self,
        proposal_id: i64,
        started_at: DateTime<Utc>,
    ) -> DomainResult<ActionRecord> {
        let result = sqlx::query(
            "INSERT INTO action_records (proposal_id, started_at) VALUES (?, ?)",
        )
        .bind(proposal_id)
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_record(result.last_insert_rowid()).await
    }

    pub async fn finish_record(
        &self,
        record_id: i64,
        success: bool,
        error_message: Option<&str>,
        result_data: Option<&serde_json::Value>,
    ) -> DomainResult<()> {
        let result_json = result_data.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "UPDATE action_records SET completed_at = ?, success = ?, error_message = ?, result_data = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(i64::from(success))
        .bind(error_message)
        .bind(result_json)
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_record(&self, record_id: i64) -> DomainResult<ActionRecord> {
        let row = sqlx::query("SELECT * FROM action_records WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DomainError::Database(format!("record {record_id} not found")))?;
        Self::row_to_record(&row)
    }

    /// All execution records for a proposal, newest first. One per attempt.
    pub async fn records_for_proposal(&self, proposal_id: i64) -> DomainResult<Vec<ActionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM action_records WHERE proposal_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    // =========================================================================
    // Workflow operations
    // =========================================================================

    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        ticket_id: Option<i64>,
    ) -> DomainResult<WorkflowProposal> {
        let result = sqlx::query(
            "INSERT INTO workflows (name, description, ticket_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(ticket_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_workflow(result.last_insert_rowid()).await
    }

    pub async fn get_workflow(&self, workflow_id: i64) -> DomainResult<WorkflowProposal> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;
        Self::row_to_workflow(&row)
    }

    pub async fn update_workflow_status(
        &self,
        workflow_id: i64,
        status: WorkflowStatus,
    ) -> DomainResult<()> {
        sqlx::query("UPDATE workflows SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Member proposals of a workflow in execution order.
    pub async fn workflow_members(&self, workflow_id: i64) -> DomainResult<Vec<ActionProposal>> {
        let rows = sqlx::query(
            "SELECT * FROM action_proposals WHERE workflow_id = ? ORDER BY execution_order ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_proposal).collect()
    }

    /// Approving a workflow approves all of its members.
    pub async fn approve_workflow(&self, workflow_id: i64, approved_by: &str) -> DomainResult<()> {
        // Workflow existence check first, so an unknown id is a typed error.
        self.get_workflow(workflow_id).await?;
        sqlx::query(
            "UPDATE action_proposals SET approved_at = ?, approved_by = ?
             WHERE workflow_id = ? AND status IN ('proposed', 'validated')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(approved_by)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
