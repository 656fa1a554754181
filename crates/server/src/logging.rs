use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,teloxide=warn,reqwest=warn,hyper=warn";
const LOG_FILE: &str = "joinwarden.log";

/// Keeps the file writer flushing; `run_id` tags the process's root span.
pub struct LoggingHandle {
    pub run_id: String,
    _guard: WorkerGuard,
}

/// Create `<data_dir>/logs` and return it.
pub fn prepare_log_dir(data_dir: &Path) -> std::io::Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

fn filter_from_env() -> EnvFilter {
    std::env::var("JOINWARDEN_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_logging(data_dir: &Path) -> anyhow::Result<LoggingHandle> {
    let log_dir = prepare_log_dir(data_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    if std::env::var("JOINWARDEN_TRUNCATE_LOG_ON_START").as_deref() == Ok("1") {
        let _ = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)?;
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("JOINWARDEN_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(filter_from_env())
        .with(stderr);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    }

    let run_id = std::env::var("JOINWARDEN_RUN_ID").unwrap_or_else(|_| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    });

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        log_path = %log_path.display(),
        format = %format,
        filter = %std::env::var("JOINWARDEN_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
    );

    Ok(LoggingHandle {
        run_id,
        _guard: guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_is_created_under_the_data_dir() {
        let data = tempfile::tempdir().unwrap();
        let dir = prepare_log_dir(&data.path().join("nested")).unwrap();

        assert_eq!(dir, data.path().join("nested").join("logs"));
        assert!(dir.is_dir());
        // idempotent
        assert_eq!(prepare_log_dir(&data.path().join("nested")).unwrap(), dir);
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
