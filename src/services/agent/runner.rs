//! Agent runner: diagnose open tickets, propose and drive remediation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::action::ActionProposal;
use crate::domain::models::diagnosis::DiagnosisOutput;
use crate::domain::models::ticket::{Ticket, TicketStatus};
use crate::domain::ports::llm::LlmClient;
use crate::domain::ports::subject::Subject;
use crate::infrastructure::database::TicketRepository;
use crate::infrastructure::llm::types::{Message, MessageRequest, ToolChoice};
use crate::services::agent::context::ContextGatherer;
use crate::services::agent::diagnosis::{
    diagnosis_tool, parse_diagnosis_response, DiagnosisOutcome, DIAGNOSIS_TOOL_NAME,
};
use crate::services::agent::prompt::{build_diagnosis_prompt, SYSTEM_PROMPT};
use crate::services::dispatcher::ActionDispatcher;
use crate::services::shutdown::ShutdownSignal;

/// Marker stored as a diagnosis when the model refuses or truncates
/// without usable output, so the ticket does not requeue forever. The
/// ticket stays non-open until its violation re-fires.
const DIAGNOSIS_ERROR_HEADER: &str = "# Diagnosis Error";

/// Tunables for the agent loop.
pub struct AgentSettings {
    pub poll_interval: Duration,
    pub model: String,
    pub max_tokens: u32,
    pub verify_delay: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            verify_delay: Duration::from_secs(5),
        }
    }
}

/// Daemon that processes tickets through LLM diagnosis and, when an
/// executor is wired and the safety mode allows, drives remediation.
///
/// Each diagnosis is a self-contained request; no LLM state is kept
/// across ticks. Tickets are processed sequentially to bound spend and
/// preserve proposal ordering per incident.
pub struct AgentRunner {
    subject: Arc<dyn Subject>,
    tickets: TicketRepository,
    llm: Arc<dyn LlmClient>,
    gatherer: ContextGatherer,
    /// None means observe-only: diagnose but never propose.
    dispatcher: Option<Arc<ActionDispatcher>>,
    settings: AgentSettings,
    shutdown: ShutdownSignal,
}

impl AgentRunner {
    pub fn new(
        subject: Arc<dyn Subject>,
        tickets: TicketRepository,
        llm: Arc<dyn LlmClient>,
        gatherer: ContextGatherer,
        dispatcher: Option<Arc<ActionDispatcher>>,
        settings: AgentSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            subject,
            tickets,
            llm,
            gatherer,
            dispatcher,
            settings,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(&self) -> DomainResult<()> {
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs_f64(),
            "agent runner starting"
        );

        while !self.shutdown.is_set() {
            self.process_cycle().await;
            self.shutdown.wait_timeout(self.settings.poll_interval).await;
        }

        info!("agent runner stopped");
        Ok(())
    }

    /// One agent tick: diagnose open tickets sequentially, then drain
    /// the scheduled and retry queues.
    pub async fn process_cycle(&self) {
        match self.tickets.list(Some(TicketStatus::Open)).await {
            Ok(open) => {
                if !open.is_empty() {
                    info!(count = open.len(), "open tickets to diagnose");
                }
                for ticket in open {
                    if self.shutdown.is_set() {
                        break;
                    }
                    self.diagnose_ticket(&ticket).await;
                }
            }
            Err(err) => error!(error = %err, "failed to list open tickets"),
        }

        self.drain_scheduled().await;
        self.drain_retries().await;
    }

    /// Diagnose one ticket outside the polling loop (CLI one-shot path).
    pub async fn diagnose_once(&self, ticket: &Ticket) {
        self.diagnose_ticket(ticket).await;
    }

    /// Diagnose one ticket. Transient LLM failures leave the ticket
    /// open for the next cycle; refusal and unusable truncation write a
    /// terminal marker.
    async fn diagnose_ticket(&self, ticket: &Ticket) {
        info!(ticket_id = ticket.id, invariant = %ticket.invariant_name, "diagnosing ticket");

        let context = match self.gatherer.gather(ticket).await {
            Ok(context) => context,
            Err(err) => {
                error!(error = %err, ticket_id = ticket.id, "context gathering failed");
                return;
            }
        };

        let request = MessageRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user(build_diagnosis_prompt(&context))],
            tools: vec![diagnosis_tool()],
            tool_choice: Some(ToolChoice::Tool {
                name: DIAGNOSIS_TOOL_NAME.to_string(),
            }),
        };

        let response = match self.llm.send_message(request).await {
            Ok(response) => response,
            Err(err) => {
                // Transient path: back off to the next cycle, ticket stays open.
                warn!(error = %err, ticket_id = ticket.id, "LLM request failed, will retry next cycle");
                return;
            }
        };

        let outcome = match parse_diagnosis_response(&response) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Non-conforming output is terminal: mark the ticket so it
                // is not reprocessed until the violation re-fires.
                error!(error = %err, ticket_id = ticket.id, "rejecting non-conforming diagnosis");
                self.write_diagnosis_marker(ticket.id, &err.to_string()).await;
                return;
            }
        };

        let output = match outcome {
            DiagnosisOutcome::Complete(output) => output,
            DiagnosisOutcome::Truncated(Some(output)) => {
                warn!(ticket_id = ticket.id, "diagnosis truncated, using partial output");
                output
            }
            DiagnosisOutcome::Truncated(None) => {
                self.write_diagnosis_marker(ticket.id, "Diagnosis truncated at the token limit with no usable output.")
                    .await;
                return;
            }
            DiagnosisOutcome::Refused => {
                self.write_diagnosis_marker(ticket.id, "The model declined to provide a diagnosis.")
                    .await;
                return;
            }
        };

        if let Err(err) = self
            .tickets
            .update_diagnosis(ticket.id, &output.to_markdown())
            .await
        {
            error!(error = %err, ticket_id = ticket.id, "failed to store diagnosis");
            return;
        }
        info!(
            ticket_id = ticket.id,
            severity = %output.severity,
            recommendations = output.recommended_actions.len(),
            "diagnosis stored"
        );

        self.propose_actions(&output, ticket.id).await;
    }

    async fn write_diagnosis_marker(&self, ticket_id: i64, detail: &str) {
        let marker = format!("{DIAGNOSIS_ERROR_HEADER}\n\n{detail}");
        if let Err(err) = self.tickets.update_diagnosis(ticket_id, &marker).await {
            error!(error = %err, ticket_id, "failed to store diagnosis marker");
        }
    }

    /// Drive each recommendation through propose -> validate -> execute,
    /// then verify. Stops at the first observe-only signal.
    async fn propose_actions(&self, output: &DiagnosisOutput, ticket_id: i64) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        if output.recommended_actions.is_empty() {
            return;
        }

        for recommendation in &output.recommended_actions {
            let proposal = match dispatcher.propose(recommendation, Some(ticket_id)).await {
                Ok(proposal) => proposal,
                Err(DomainError::ObserveOnly) => {
                    info!("skipping action proposals: observe-only mode active");
                    break;
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        action = %recommendation.action_name,
                        "action proposal failed"
                    );
                    continue;
                }
            };

            if let Err(err) = dispatcher.validate_proposal(proposal.id).await {
                warn!(error = %err, proposal_id = proposal.id, "validation failed");
                continue;
            }

            match dispatcher
                .execute_proposal(proposal.id, Arc::clone(&self.subject))
                .await
            {
                Ok(record) if record.success == Some(true) => {
                    info!(proposal_id = proposal.id, action = %proposal.action_name, "action executed");
                    self.verify_action(proposal.id, ticket_id).await;
                }
                Ok(record) => {
                    let error = record.error_message.unwrap_or_else(|| "unknown".to_string());
                    warn!(proposal_id = proposal.id, %error, "action execution failed");
                    self.schedule_retry(dispatcher, proposal.id, &error).await;
                }
                Err(DomainError::ObserveOnly) => {
                    info!("stopping action execution: observe-only mode active");
                    break;
                }
                Err(DomainError::ApprovalRequired { proposal_id, .. }) => {
                    info!(proposal_id, "proposal awaits approval");
                }
                Err(err) => {
                    warn!(error = %err, proposal_id = proposal.id, "action execution errored");
                }
            }
        }
    }

    /// Wait for effects to propagate, then re-observe the subject.
    async fn verify_action(&self, proposal_id: i64, ticket_id: i64) {
        tokio::time::sleep(self.settings.verify_delay).await;
        match self.subject.observe().await {
            Ok(observation) => info!(
                proposal_id,
                ticket_id,
                observed_keys = observation.len(),
                "post-action verification observation captured"
            ),
            Err(err) => warn!(
                proposal_id,
                ticket_id,
                error = %err,
                "post-action verification observation failed"
            ),
        }
    }

    /// Execute validated proposals whose scheduled time has arrived.
    async fn drain_scheduled(&self) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };

        let due = match dispatcher.actions().list_due_scheduled(chrono::Utc::now()).await {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "failed to query scheduled actions");
                return;
            }
        };

        if !due.is_empty() {
            info!(count = due.len(), "scheduled actions ready to execute");
        }

        for proposal in due {
            if self.shutdown.is_set() {
                break;
            }
            self.execute_drained(dispatcher, &proposal).await;
        }
    }

    /// Retry failed proposals whose backoff has elapsed.
    async fn drain_retries(&self) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };

        let eligible = match dispatcher
            .actions()
            .list_retry_eligible(chrono::Utc::now())
            .await
        {
            Ok(eligible) => eligible,
            Err(err) => {
                error!(error = %err, "failed to query retry-eligible actions");
                return;
            }
        };

        if !eligible.is_empty() {
            info!(count = eligible.len(), "actions eligible for retry");
        }

        for proposal in eligible {
            if self.shutdown.is_set() {
                break;
            }
            info!(
                proposal_id = proposal.id,
                attempt = proposal.retry_count + 1,
                max = proposal.max_retries,
                "retrying failed action"
            );
            if let Err(err) = dispatcher.actions().reset_for_retry(proposal.id).await {
                error!(error = %err, proposal_id = proposal.id, "retry reset failed");
                continue;
            }
            self.execute_drained(dispatcher, &proposal).await;
        }
    }

    async fn execute_drained(&self, dispatcher: &Arc<ActionDispatcher>, proposal: &ActionProposal) {
        match dispatcher
            .execute_proposal(proposal.id, Arc::clone(&self.subject))
            .await
        {
            Ok(record) if record.success == Some(true) => {
                info!(proposal_id = proposal.id, "drained action completed");
            }
            Ok(record) => {
                let error = record.error_message.unwrap_or_else(|| "unknown".to_string());
                self.schedule_retry(dispatcher, proposal.id, &error).await;
            }
            Err(DomainError::ApprovalRequired { proposal_id, .. }) => {
                // Stays validated; explicit user approval resumes it.
                info!(proposal_id, "drained action awaits approval");
            }
            Err(DomainError::ObserveOnly) => {
                info!("drain stopped: observe-only mode active");
            }
            Err(err) => {
                warn!(error = %err, proposal_id = proposal.id, "drained action errored");
            }
        }
    }

    async fn schedule_retry(
        &self,
        dispatcher: &Arc<ActionDispatcher>,
        proposal_id: i64,
        error: &str,
    ) {
        match dispatcher.schedule_next_retry(proposal_id, error).await {
            Ok(Some(next)) => {
                info!(proposal_id, next_retry_at = %next.to_rfc3339(), "retry scheduled");
            }
            Ok(None) => {
                warn!(proposal_id, "retry budget exhausted");
            }
            Err(err) => {
                error!(error = %err, proposal_id, "failed to schedule retry");
            }
        }
    }
}
