//! Baseline install scripts
//!
//! Scripts are line-oriented. One statement per line, `;` optional, `--`
//! starts a comment, keywords are case-insensitive:
//!
//! ```text
//! CREATE TABLE <table>
//! PUT <table> <key> <json>
//! DELETE <table> <key>
//! ```
//!
//! Each file runs inside one write transaction. The first failing statement
//! aborts its file and the whole install.

use crate::engine::CatalogSession;
use crate::{Error, Result};
use heed::RwTxn;
use std::fmt;
use std::path::{Path, PathBuf};

/// Subdirectory of a script directory applied after the main scripts
pub const HOTFIX_DIR: &str = "hotfix";

const BUILTIN_SCRIPTS: &[(&str, &str)] = &[
    (
        "0001_schema.sql",
        include_str!("../../scripts/0001_schema.sql"),
    ),
    (
        "0002_baseline.sql",
        include_str!("../../scripts/0002_baseline.sql"),
    ),
];

/// Where baseline scripts come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScriptSource {
    /// Scripts embedded in the crate
    #[default]
    Builtin,
    /// All `*.sql` files of a directory, in lexical order
    Directory(PathBuf),
}

/// Settings for a baseline install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSettings {
    /// Script location
    pub source: ScriptSource,
    /// Also apply `hotfix/*.sql` after the main scripts
    pub apply_hotfix: bool,
}

impl InstallSettings {
    /// Install from a script directory
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: ScriptSource::Directory(dir.into()),
            apply_hotfix: false,
        }
    }

    /// Enable or disable the hotfix pass
    pub fn with_hotfix(mut self, apply: bool) -> Self {
        self.apply_hotfix = apply;
        self
    }
}

/// Severity of an install log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Progress
    Info,
    /// Something unusual that did not stop the install
    Warning,
    /// The install failed here
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "Info"),
            LogLevel::Warning => write!(f, "Warning"),
            LogLevel::Error => write!(f, "Error"),
        }
    }
}

/// One install log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

/// Structured log captured while installing scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallLog {
    entries: Vec<LogEntry>,
}

impl InstallLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::debug!("install: {}", message),
            LogLevel::Warning => tracing::warn!("install: {}", message),
            LogLevel::Error => tracing::error!("install: {}", message),
        }
        self.entries.push(LogEntry { level, message });
    }

    /// All entries in order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Whether any entry is an error
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }
}

impl fmt::Display for InstallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {}", entry.level, entry.message)?;
        }
        Ok(())
    }
}

/// A parsed script statement
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    CreateTable(String),
    Put {
        table: String,
        key: String,
        value: String,
    },
    Delete {
        table: String,
        key: String,
    },
}

/// Parse one script line; `Ok(None)` for blank lines and comments
fn parse_line(line: &str) -> std::result::Result<Option<Statement>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("--") {
        return Ok(None);
    }
    let line = line.strip_suffix(';').unwrap_or(line).trim_end();
    if line.is_empty() {
        return Ok(None);
    }

    let (keyword, rest) = split_word(line);
    match keyword.to_ascii_uppercase().as_str() {
        "CREATE" => {
            let (object, rest) = split_word(rest);
            if !object.eq_ignore_ascii_case("TABLE") {
                return Err(format!("expected TABLE after CREATE, found '{}'", object));
            }
            let (table, trailing) = split_word(rest);
            if table.is_empty() {
                return Err("CREATE TABLE requires a table name".to_string());
            }
            if !trailing.is_empty() {
                return Err(format!("unexpected input after table name: '{}'", trailing));
            }
            Ok(Some(Statement::CreateTable(table.to_string())))
        }
        "PUT" => {
            let (table, rest) = split_word(rest);
            let (key, value) = split_word(rest);
            if table.is_empty() || key.is_empty() || value.is_empty() {
                return Err("PUT requires a table, a key and a JSON value".to_string());
            }
            serde_json::from_str::<serde_json::Value>(value)
                .map_err(|e| format!("invalid JSON value: {}", e))?;
            Ok(Some(Statement::Put {
                table: table.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            }))
        }
        "DELETE" => {
            let (table, rest) = split_word(rest);
            let (key, trailing) = split_word(rest);
            if table.is_empty() || key.is_empty() {
                return Err("DELETE requires a table and a key".to_string());
            }
            if !trailing.is_empty() {
                return Err(format!("unexpected input after key: '{}'", trailing));
            }
            Ok(Some(Statement::Delete {
                table: table.to_string(),
                key: key.to_string(),
            }))
        }
        other => Err(format!("unknown statement '{}'", other)),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

fn apply(session: &CatalogSession, wtxn: &mut RwTxn<'_>, statement: &Statement) -> Result<()> {
    match statement {
        Statement::CreateTable(table) => session.create_table_in(wtxn, table),
        Statement::Put { table, key, value } => session.put_in(wtxn, table, key, value),
        Statement::Delete { table, key } => session.delete_in(wtxn, table, key).map(|_| ()),
    }
}

/// Load `(file name, contents)` pairs for a source, in execution order
fn load_scripts(settings: &InstallSettings) -> std::result::Result<Vec<(String, String)>, String> {
    match &settings.source {
        ScriptSource::Builtin => Ok(BUILTIN_SCRIPTS
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect()),
        ScriptSource::Directory(dir) => {
            let mut scripts = read_sql_files(dir, None)?;
            if settings.apply_hotfix {
                let hotfix = dir.join(HOTFIX_DIR);
                if hotfix.is_dir() {
                    scripts.extend(read_sql_files(&hotfix, Some(HOTFIX_DIR))?);
                }
            }
            Ok(scripts)
        }
    }
}

fn read_sql_files(
    dir: &Path,
    label: Option<&str>,
) -> std::result::Result<Vec<(String, String)>, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot read script directory {}: {}", dir.display(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match label {
            Some(label) => format!("{}/{}", label, file_name),
            None => file_name,
        };
        let body = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        scripts.push((name, body));
    }
    Ok(scripts)
}

/// Run every script of `settings` against an open session
pub fn install(session: &CatalogSession, settings: &InstallSettings) -> Result<InstallLog> {
    let mut log = InstallLog::new();
    log.push(
        LogLevel::Info,
        format!("Installing baseline into catalog '{}'", session.catalog()),
    );

    let scripts = match load_scripts(settings) {
        Ok(scripts) => scripts,
        Err(reason) => {
            log.push(LogLevel::Error, reason);
            return Err(Error::InstallFailed { log });
        }
    };
    if scripts.is_empty() {
        log.push(LogLevel::Warning, "No scripts found");
    }

    for (name, body) in &scripts {
        let mut wtxn = session.write_txn()?;
        let mut applied = 0usize;

        for (idx, line) in body.lines().enumerate() {
            let outcome = parse_line(line).and_then(|statement| match statement {
                Some(statement) => apply(session, &mut wtxn, &statement)
                    .map(|_| applied += 1)
                    .map_err(|e| e.to_string()),
                None => Ok(()),
            });

            if let Err(reason) = outcome {
                log.push(
                    LogLevel::Error,
                    format!("{}:{}: {}", name, idx + 1, reason),
                );
                // Dropping the transaction aborts the whole file
                drop(wtxn);
                return Err(Error::InstallFailed { log });
            }
        }

        wtxn.commit()?;
        log.push(
            LogLevel::Info,
            format!("Applied {} statements from {}", applied, name),
        );
    }

    log.push(LogLevel::Info, "Baseline installed");
    Ok(log)
}
