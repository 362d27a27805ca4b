use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing until dropped.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn file_logging_enabled() -> bool {
    crate::config::env_flag("ENABLE_FILE_LOGS")
}

/// A bare level such as `debug` scopes to the ledger and its HTTP layer and
/// keeps sqlx statement logs at `warn`. Full directive strings pass through.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        return filter_directives("info");
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("xp_ledger_backend={level},tower_http={level},sqlx=warn,warn")
}

pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(filter_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directives("info")));
    let stdout_layer = fmt::layer().with_target(true);

    if file_logging_enabled() {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        if let Err(err) = std::fs::create_dir_all(&log_dir) {
            eprintln!("failed to create log directory {log_dir}: {err}");
        } else {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "xp-ledger.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            return Some(FileLogGuard { _guard: guard });
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();

    None
}

#[cfg(test)]
mod tests {
    use super::filter_directives;

    #[test]
    fn test_bare_level_is_scoped_to_ledger() {
        assert_eq!(
            filter_directives("debug"),
            "xp_ledger_backend=debug,tower_http=debug,sqlx=warn,warn"
        );
        assert_eq!(
            filter_directives(""),
            "xp_ledger_backend=info,tower_http=info,sqlx=warn,warn"
        );
    }

    #[test]
    fn test_explicit_directives_pass_through() {
        assert_eq!(filter_directives("sqlx=debug,info"), "sqlx=debug,info");
    }
}
