use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    pub journal_mode: SqliteJournalMode,
    pub synchronous: SqliteSynchronous,
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub foreign_keys: bool,
    pub health_check_timeout: Duration,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let path = std::env::var("SQLITE_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_sqlite_path);

        let journal_mode = std::env::var("SQLITE_JOURNAL_MODE")
            .ok()
            .as_deref()
            .and_then(SqliteJournalMode::parse)
            .unwrap_or(SqliteJournalMode::Wal);

        let synchronous = std::env::var("SQLITE_SYNCHRONOUS")
            .ok()
            .as_deref()
            .and_then(SqliteSynchronous::parse)
            .unwrap_or(SqliteSynchronous::Full);

        let max_connections = env_u32("DB_MAX_CONNECTIONS", 5);
        if max_connections == 0 {
            return Err(DbConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            path,
            journal_mode,
            synchronous,
            busy_timeout: Duration::from_millis(env_u64("SQLITE_BUSY_TIMEOUT_MS", 5000)),
            max_connections,
            foreign_keys: env_bool("SQLITE_FOREIGN_KEYS", true),
            health_check_timeout: Duration::from_millis(env_u64(
                "DB_HEALTH_CHECK_TIMEOUT_MS",
                3000,
            )),
        })
    }

    /// Defaults for a database file at `path`; used by tests and tooling.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
            busy_timeout: Duration::from_secs(30),
            max_connections: 5,
            foreign_keys: true,
            health_check_timeout: Duration::from_secs(3),
        }
    }
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("xp-ledger")
        .join("ledger.db")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteJournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl SqliteJournalMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "WAL" => Some(Self::Wal),
            "DELETE" => Some(Self::Delete),
            "TRUNCATE" => Some(Self::Truncate),
            "MEMORY" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn to_sqlx(self) -> sqlx::sqlite::SqliteJournalMode {
        match self {
            SqliteJournalMode::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            SqliteJournalMode::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            SqliteJournalMode::Truncate => sqlx::sqlite::SqliteJournalMode::Truncate,
            SqliteJournalMode::Memory => sqlx::sqlite::SqliteJournalMode::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteSynchronous {
    Off,
    Normal,
    Full,
}

impl SqliteSynchronous {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "OFF" => Some(Self::Off),
            "NORMAL" => Some(Self::Normal),
            "FULL" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn to_sqlx(self) -> sqlx::sqlite::SqliteSynchronous {
        match self {
            SqliteSynchronous::Off => sqlx::sqlite::SqliteSynchronous::Off,
            SqliteSynchronous::Normal => sqlx::sqlite::SqliteSynchronous::Normal,
            SqliteSynchronous::Full => sqlx::sqlite::SqliteSynchronous::Full,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}
