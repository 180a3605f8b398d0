//! `warden agent start` and `warden agent diagnose`

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::commands::AppContext;
use crate::cli::output;
use crate::domain::ports::llm::LlmClient;
use crate::infrastructure::llm::{AnthropicClient, AnthropicClientConfig};
use crate::services::agent::context::ContextGatherer;
use crate::services::agent::runner::{AgentRunner, AgentSettings};
use crate::services::registry::ActionRegistry;
use crate::services::safety::SafetyMode;
use crate::services::shutdown::ShutdownSignal;
use crate::subjects;

fn llm_client(ctx: &AppContext) -> Result<Arc<dyn LlmClient>> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
    let client = AnthropicClient::with_config(AnthropicClientConfig {
        api_key,
        base_url: ctx.config.llm.base_url.clone(),
        max_retries: ctx.config.llm.max_retries,
        initial_backoff_ms: ctx.config.llm.initial_backoff_ms,
        max_backoff_ms: ctx.config.llm.max_backoff_ms,
        timeout_secs: ctx.config.llm.timeout_secs,
    })?;
    Ok(Arc::new(client))
}

fn settings(ctx: &AppContext) -> AgentSettings {
    AgentSettings {
        poll_interval: Duration::from_secs_f64(ctx.config.agent.poll_interval_secs),
        model: ctx.config.agent.model.clone(),
        max_tokens: ctx.config.agent.max_tokens,
        verify_delay: Duration::from_secs_f64(ctx.config.agent.verify_delay_secs),
    }
}

pub async fn handle_start(ctx: &AppContext, subject_name: &str, execute: bool) -> Result<()> {
    let subject = subjects::build_subject(subject_name)?;
    let registry = Arc::new(ActionRegistry::new(Arc::clone(&subject)));
    let gatherer = ContextGatherer::new(
        Arc::clone(&subject),
        ctx.tickets(),
        Arc::clone(&registry),
        ctx.config.agent.similar_ticket_limit,
    );

    let mode = if execute {
        SafetyMode::Execute
    } else {
        SafetyMode::Observe
    };
    let safety = ctx.safety(mode);
    let dispatcher = ctx.dispatcher(&subject, Arc::clone(&safety));

    let shutdown = ShutdownSignal::new();
    shutdown.install_handlers()?;

    let runner = AgentRunner::new(
        Arc::clone(&subject),
        ctx.tickets(),
        llm_client(ctx)?,
        gatherer,
        Some(dispatcher),
        settings(ctx),
        shutdown,
    );
    runner.run().await?;
    Ok(())
}

/// One-shot diagnosis of a single ticket. Never proposes actions.
pub async fn handle_diagnose(ctx: &AppContext, ticket_id: i64, subject_name: &str) -> Result<()> {
    let tickets = ctx.tickets();
    let ticket = tickets.get(ticket_id).await?;
    if ticket.diagnosis.is_some() {
        bail!("ticket {ticket_id} already has a diagnosis; resolve or wait for a re-fire");
    }

    let subject = subjects::build_subject(subject_name)?;
    let registry = Arc::new(ActionRegistry::new(Arc::clone(&subject)));
    let gatherer = ContextGatherer::new(
        Arc::clone(&subject),
        ctx.tickets(),
        registry,
        ctx.config.agent.similar_ticket_limit,
    );

    let runner = AgentRunner::new(
        Arc::clone(&subject),
        ctx.tickets(),
        llm_client(ctx)?,
        gatherer,
        None,
        settings(ctx),
        ShutdownSignal::new(),
    );
    runner.diagnose_once(&ticket).await;

    let updated = tickets.get(ticket_id).await?;
    output::print_ticket(&updated);
    Ok(())
}
