// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Drain Binary
//!
//! Entry point for a bounded drain run: assemble the configuration from the
//! environment, route logs to the configured file, open a consumer session
//! and drive the policy/handler pairing selected by the drain mode. An
//! interrupt cancels the session instead of killing the process, so the
//! shutdown sequence always runs.

use amqp_drain::{
    config::{DrainConfig, DrainMode},
    errors::DrainError,
    handler::{CountEcho, MessageHandler, SinkRecorder, SizeEcho},
    policy::TerminationPolicy,
    queue::QueueHandle,
    session::{ConsumerSession, DrainReport},
    sink::RecordSink,
};
use std::{error::Error, fs::OpenOptions, path::Path, sync::Arc};
use tracing::{error, info, Event, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cfg = DrainConfig::from_env()?;
    init_logging(&cfg.log_path)?;

    info!(
        queue = %cfg.queue.name(),
        mode = ?cfg.mode,
        output = %cfg.output_path.display(),
        "starting queue drain"
    );

    let sink = RecordSink::append(&cfg.output_path).await?;
    let mut session = ConsumerSession::new(cfg.endpoint.clone(), cfg.queue.clone(), sink);

    let cancel = session.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    let outcome = drive(&mut session, &cfg).await;
    session.stop().await;

    match outcome {
        Ok(report) => {
            info!(
                records = report.persisted,
                processed = report.processed,
                reason = ?report.reason,
                "number of non-empty records persisted"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = err.to_string(), "drain session failed");
            Err(err.into())
        }
    }
}

/// Walks the session through its lifecycle and consumes under the pairing
/// selected by the configured mode.
async fn drive(
    session: &mut ConsumerSession,
    cfg: &DrainConfig,
) -> Result<DrainReport, DrainError> {
    session.connect().await?;
    session.open_channel().await?;

    let queue = session.declare_queue().await?;
    info!(queue = %queue.name, messages = queue.message_count, "queue ready");

    let (policy, handler) = pairing(cfg, &queue);
    session.consume(policy, handler.as_ref()).await
}

/// Selects the termination policy and handler for the configured mode.
///
/// The count-bounded pairing budgets on the queue depth reported at declare
/// time, so it stops once the backlog observed at startup is worked off.
fn pairing(cfg: &DrainConfig, queue: &QueueHandle) -> (TerminationPolicy, Box<dyn MessageHandler>) {
    match cfg.mode {
        DrainMode::Persist => (
            TerminationPolicy::deadline_in(cfg.window),
            Box::new(SinkRecorder),
        ),
        DrainMode::Count => (
            TerminationPolicy::RemainingCount(u64::from(queue.message_count)),
            Box::new(CountEcho),
        ),
        DrainMode::Echo => (
            TerminationPolicy::deadline_in(cfg.window),
            Box::new(SizeEcho),
        ),
    }
}

/// Formats events as `LEVEL:target:message fields`, one line each, so the
/// log file stays greppable by plain tooling.
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(writer, "{}:{}:", meta.level(), meta.target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Routes all events to the log file, appending across runs.
fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("amqp_drain=debug")),
        )
        .with(
            fmt::layer()
                .event_format(LineFormat)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}
