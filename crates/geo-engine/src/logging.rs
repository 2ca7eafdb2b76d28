//! Logging bring-up: a non-blocking file writer plus a panic hook that logs
//! before chaining to the default one. Lives here rather than only in
//! `geo-bin` because any embedder of this engine — not just the CLI — needs
//! the same `tracing` wiring initialised exactly once.

use std::path::Path;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::EngineConfig;

static PANIC_HOOK: Once = Once::new();

/// Install `tracing_subscriber`'s global subscriber, writing to a rolling
/// (never-rotated) file under `log_dir/file_name`. The returned guard must
/// be held for the process lifetime — dropping it stops the background
/// flush thread and silently truncates buffered log lines.
pub fn init_logging(config: &EngineConfig, log_dir: &Path, file_name: &str) -> anyhow::Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = tracing_subscriber::EnvFilter::try_new(&config.file.log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;
    Ok(guard)
}

/// Log a panic via `tracing::error!` before chaining to whatever hook was
/// previously installed, so a crash is visible in the log file even when
/// stderr is redirected away. Idempotent: a second call is a no-op.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(panic = %info, "panicked");
            previous(info);
        }));
    });
}
