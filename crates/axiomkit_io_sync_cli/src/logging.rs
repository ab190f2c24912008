use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// `timestamp - LEVEL - message` lines for the log file.
struct FormatLogLine;

impl<S, N> FormatEvent<S, N> for FormatLogLine
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        SystemTime.format_time(&mut writer)?;
        write!(writer, " - {} - ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install console and file logging.
///
/// The level comes from `RUST_LOG` (default `info`). The file is opened in
/// append mode; keep the returned guard alive until the run ends so buffered
/// records are flushed.
pub fn init_logger(path_log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path_parent) = path_log_file.parent()
        && !path_parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(path_parent).with_context(|| {
            format!("Failed to create log directory '{}'", path_parent.display())
        })?;
    }
    let file_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path_log_file)
        .with_context(|| format!("Failed to open log file '{}'", path_log_file.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_log);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_fmt::layer()
                .with_writer(std::io::stdout)
                .without_time()
                .with_level(false)
                .with_target(false),
        )
        .with(
            tracing_fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(FormatLogLine),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok(guard)
}
