//! `warden monitor run`

use anyhow::Result;
use std::time::Duration;

use crate::cli::commands::AppContext;
use crate::services::monitor::MonitorLoop;
use crate::services::shutdown::ShutdownSignal;
use crate::subjects;

pub async fn handle_run(ctx: &AppContext, subject_name: &str, interval: Option<f64>) -> Result<()> {
    let subject = subjects::build_subject(subject_name)?;
    let checker = subjects::build_checker(subject_name)?;

    let interval = Duration::from_secs_f64(interval.unwrap_or(ctx.config.monitor.interval_secs));

    let shutdown = ShutdownSignal::new();
    shutdown.install_handlers()?;

    let mut monitor = MonitorLoop::new(subject, checker, ctx.tickets(), interval, shutdown);
    monitor.run().await?;
    Ok(())
}
