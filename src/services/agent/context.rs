//! Diagnosis context assembly.

use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::registry::ActionDefinition;
use crate::domain::models::ticket::{Observation, Ticket};
use crate::domain::ports::subject::Subject;
use crate::infrastructure::database::TicketRepository;
use crate::services::registry::ActionRegistry;

/// Everything the diagnosis prompt is built from.
pub struct DiagnosisContext {
    pub ticket: Ticket,
    /// Current observation; None when the subject is unreachable.
    pub observation: Option<Observation>,
    /// Recent log lines from the subject, when available.
    pub log_tail: Option<String>,
    /// Similar past tickets (same invariant or entity).
    pub similar_tickets: Vec<Ticket>,
    /// Actions the model may recommend.
    pub available_actions: Vec<ActionDefinition>,
}

/// Assembles diagnosis context from the subject and ticket history.
pub struct ContextGatherer {
    subject: Arc<dyn Subject>,
    tickets: TicketRepository,
    registry: Arc<ActionRegistry>,
    similar_limit: usize,
}

impl ContextGatherer {
    pub fn new(
        subject: Arc<dyn Subject>,
        tickets: TicketRepository,
        registry: Arc<ActionRegistry>,
        similar_limit: usize,
    ) -> Self {
        Self {
            subject,
            tickets,
            registry,
            similar_limit,
        }
    }

    /// Gather context for one ticket. A failed observation is not fatal:
    /// diagnosis proceeds on the snapshot captured at detection time.
    pub async fn gather(&self, ticket: &Ticket) -> DomainResult<DiagnosisContext> {
        let observation = match self.subject.observe().await {
            Ok(observation) => Some(observation),
            Err(err) => {
                debug!(error = %err, ticket_id = ticket.id, "observation unavailable for context");
                None
            }
        };

        let log_tail = self.subject.log_tail(50).await;
        let similar_tickets = self.tickets.list_similar(ticket, self.similar_limit).await?;
        let available_actions = self.registry.definitions();

        Ok(DiagnosisContext {
            ticket: ticket.clone(),
            observation,
            log_tail,
            similar_tickets,
            available_actions,
        })
    }
}
