//! Command handlers.

pub mod actions;
pub mod agent;
pub mod eval;
pub mod monitor;
pub mod tickets;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::domain::models::config::Config;
use crate::infrastructure::database::{
    ActionRepository, AuditLogRepository, DatabaseConnection, TicketRepository,
};
use crate::services::audit::ActionAuditor;
use crate::services::dispatcher::ActionDispatcher;
use crate::services::registry::ActionRegistry;
use crate::services::retry::RetryPlanner;
use crate::services::safety::{SafetyController, SafetyMode};
use crate::services::tools::GeneralToolExecutor;
use crate::domain::ports::authorization::{AllowAllCapabilities, AllowAllPermissions};
use crate::domain::ports::subject::Subject;

/// Shared database handle plus the repositories built over it.
pub struct AppContext {
    pub config: Config,
    pub db: DatabaseConnection,
}

impl AppContext {
    /// Open (and migrate) the operator database.
    pub async fn open(config: Config) -> Result<Self> {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let db = DatabaseConnection::new(&format!("sqlite:{}", config.database.path))
            .await
            .context("Failed to connect to database")?;
        db.migrate().await.context("Failed to run database migrations")?;
        Ok(Self { config, db })
    }

    pub fn tickets(&self) -> TicketRepository {
        TicketRepository::new(self.db.pool().clone())
    }

    pub fn actions(&self) -> ActionRepository {
        ActionRepository::new(self.db.pool().clone())
    }

    pub fn audit(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.db.pool().clone())
    }

    pub fn auditor(&self) -> Arc<ActionAuditor> {
        Arc::new(ActionAuditor::new(self.audit()))
    }

    /// Wire a full dispatcher over this database for the given subject.
    pub fn dispatcher(
        &self,
        subject: &Arc<dyn Subject>,
        safety: Arc<SafetyController>,
    ) -> Arc<ActionDispatcher> {
        Arc::new(ActionDispatcher::new(
            self.actions(),
            Arc::new(ActionRegistry::new(Arc::clone(subject))),
            safety,
            self.auditor(),
            Box::new(AllowAllPermissions),
            Box::new(AllowAllCapabilities),
            Arc::new(GeneralToolExecutor::new()),
            RetryPlanner::new(self.config.retry.clone()),
            self.config.safety.approval_mode,
        ))
    }

    pub fn safety(&self, mode: SafetyMode) -> Arc<SafetyController> {
        Arc::new(SafetyController::with_mode(self.actions(), mode))
    }
}
