//! Tracing setup for the backend binary and its tests.

use std::{
    env,
    fs::File,
    io,
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::format::format,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Keeps the non-blocking file writer alive. Hold onto it for the life of the
/// process; dropping it flushes buffered log lines.
pub struct TracingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the tracing stack for the backend process: a stdout layer
/// (compact by default, `LOG_FORMAT=json` for machine ingestion) filtered by
/// `RUST_LOG` (INFO when unset), plus a file layer when `TFAAS_TRACE_FILE`
/// names a log file. Edge deployments set the file layer so logs survive
/// until the next downlink window.
pub fn config_service() -> TracingGuard {
    let mut layers = Vec::new();

    let format_layer = tracing_subscriber::fmt::layer()
        .with_ansi(env::var("NO_COLOR").is_err())
        .with_writer(io::stdout);
    let format_layer = match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => format_layer.event_format(format().json()).boxed(),
        _ => format_layer.event_format(format().compact()).boxed(),
    };
    layers.push(
        format_layer
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .boxed(),
    );

    let file_guard = match env::var("TFAAS_TRACE_FILE") {
        Ok(path) => {
            let file = File::create(&path)
                .unwrap_or_else(|e| panic!("could not create trace file {path}: {e}"));
            let (writer, guard) = tracing_appender::non_blocking(file);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new("info"))
                    .boxed(),
            );
            Some(guard)
        },
        Err(_) => None,
    };

    tracing_subscriber::registry().with(layers).init();

    TracingGuard {
        _file_guard: file_guard,
    }
}

/// Best-effort init for tests. Quietly does nothing when an earlier test in
/// the process already installed a subscriber.
pub fn config_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}
