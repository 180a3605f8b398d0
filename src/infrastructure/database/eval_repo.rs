//! Eval persistence: campaigns and trials.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::eval::{Campaign, Trial};
use crate::infrastructure::database::utils::{parse_datetime, parse_datetime_opt};

/// Fields for a new trial row. The id is assigned on insert and the row
/// is immutable afterwards.
pub struct NewTrial {
    pub campaign_id: i64,
    pub started_at: chrono::DateTime<Utc>,
    pub chaos_injected_at: chrono::DateTime<Utc>,
    pub ticket_created_at: Option<chrono::DateTime<Utc>>,
    pub resolved_at: Option<chrono::DateTime<Utc>>,
    pub ended_at: chrono::DateTime<Utc>,
    pub initial_state: String,
    pub final_state: String,
    pub chaos_metadata: String,
    pub commands_json: String,
}

/// SQLite-backed eval store, on its own database file.
pub struct EvalRepository {
    pool: SqlitePool,
}

impl EvalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_campaign(row: &SqliteRow) -> DomainResult<Campaign> {
        Ok(Campaign {
            id: row.get("id"),
            subject_name: row.get("subject_name"),
            chaos_type: row.get("chaos_type"),
            trial_count: row.get("trial_count"),
            baseline: row.get::<i64, _>("baseline") != 0,
            variant_name: row.get("variant_name"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }

    fn row_to_trial(row: &SqliteRow) -> DomainResult<Trial> {
        Ok(Trial {
            id: row.get("id"),
            campaign_id: row.get("campaign_id"),
            started_at: parse_datetime(row.get::<String, _>("started_at").as_str())?,
            chaos_injected_at: parse_datetime(row.get::<String, _>("chaos_injected_at").as_str())?,
            ticket_created_at: parse_datetime_opt(
                row.get::<Option<String>, _>("ticket_created_at").as_deref(),
            )?,
            resolved_at: parse_datetime_opt(row.get::<Option<String>, _>("resolved_at").as_deref())?,
            ended_at: parse_datetime(row.get::<String, _>("ended_at").as_str())?,
            initial_state: row.get("initial_state"),
            final_state: row.get("final_state"),
            chaos_metadata: row.get("chaos_metadata"),
            commands_json: row.get("commands_json"),
        })
    }

    pub async fn insert_campaign(
        &self,
        subject_name: &str,
        chaos_type: &str,
        trial_count: i64,
        baseline: bool,
        variant_name: Option<&str>,
    ) -> DomainResult<Campaign> {
        let result = sqlx::query(
            "INSERT INTO campaigns (subject_name, chaos_type, trial_count, baseline, variant_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(subject_name)
        .bind(chaos_type)
        .bind(trial_count)
        .bind(i64::from(baseline))
        .bind(variant_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_campaign(result.last_insert_rowid()).await
    }

    pub async fn get_campaign(&self, campaign_id: i64) -> DomainResult<Campaign> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DomainError::CampaignNotFound(campaign_id))?;
        Self::row_to_campaign(&row)
    }

    pub async fn list_campaigns(&self) -> DomainResult<Vec<Campaign>> {
        let rows = sqlx::query("SELECT * FROM campaigns ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_campaign).collect()
    }

    pub async fn insert_trial(&self, new: NewTrial) -> DomainResult<Trial> {
        let result = sqlx::query(
            "INSERT INTO trials (
                campaign_id, started_at, chaos_injected_at, ticket_created_at,
                resolved_at, ended_at, initial_state, final_state, chaos_metadata, commands_json
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.campaign_id)
        .bind(new.started_at.to_rfc3339())
        .bind(new.chaos_injected_at.to_rfc3339())
        .bind(new.ticket_created_at.map(|t| t.to_rfc3339()))
        .bind(new.resolved_at.map(|t| t.to_rfc3339()))
        .bind(new.ended_at.to_rfc3339())
        .bind(&new.initial_state)
        .bind(&new.final_state)
        .bind(&new.chaos_metadata)
        .bind(&new.commands_json)
        .execute(&self.pool)
        .await?;
        self.get_trial(result.last_insert_rowid()).await
    }

    pub async fn get_trial(&self, trial_id: i64) -> DomainResult<Trial> {
        let row = sqlx::query("SELECT * FROM trials WHERE id = ?")
            .bind(trial_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DomainError::TrialNotFound(trial_id))?;
        Self::row_to_trial(&row)
    }

    pub async fn trials_for_campaign(&self, campaign_id: i64) -> DomainResult<Vec<Trial>> {
        let rows = sqlx::query("SELECT * FROM trials WHERE campaign_id = ? ORDER BY id ASC")
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_trial).collect()
    }
}
