// 🗄️ History Store - SQLite + WAL
// Append-only calculation history, sessions and per-session settings

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// ============================================================================
// RECORDS
// ============================================================================

/// A calculation about to be recorded
#[derive(Debug, Clone, Default)]
pub struct NewCalculation {
    pub expression: String,
    pub result: String,
    pub voice_input: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub error_message: Option<String>,
    /// Seconds spent evaluating
    pub execution_time: Option<f64>,
}

impl NewCalculation {
    pub fn new(expression: impl Into<String>, result: impl Into<String>) -> Self {
        NewCalculation {
            expression: expression.into(),
            result: result.into(),
            ..Default::default()
        }
    }

    /// Builder pattern: add session
    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Builder pattern: add original spoken text
    pub fn with_voice_input(mut self, voice_input: Option<String>) -> Self {
        self.voice_input = voice_input;
        self
    }

    /// Builder pattern: add client details
    pub fn with_client(mut self, user_agent: Option<String>, ip_address: Option<String>) -> Self {
        self.user_agent = user_agent;
        self.ip_address = ip_address;
        self
    }

    pub fn with_execution_time(mut self, seconds: f64) -> Self {
        self.execution_time = Some(seconds);
        self
    }
}

/// A stored calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculationRecord {
    pub id: i64,
    pub expression: String,
    pub result: String,
    pub timestamp: DateTime<Utc>,
    pub voice_input: Option<String>,
    pub session_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub error_message: Option<String>,
    pub execution_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub calculation_count: i64,
    pub actual_calculation_count: i64,
    pub first_calculation: Option<DateTime<Utc>>,
    pub last_calculation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpressionCount {
    pub expression: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStatistics {
    pub total_calculations: i64,
    pub today_calculations: i64,
    pub total_sessions: i64,
    pub popular_expressions: Vec<ExpressionCount>,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently keep "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS calculations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            expression TEXT NOT NULL,
            result TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            voice_input TEXT,
            session_id TEXT,
            user_agent TEXT,
            ip_address TEXT,
            error_message TEXT,
            execution_time REAL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT UNIQUE NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            calculation_count INTEGER NOT NULL DEFAULT 0,
            user_agent TEXT,
            ip_address TEXT
        )",
        [],
    )?;

    // '' = global setting (NULL would defeat the UNIQUE constraint)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            session_id TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL,
            UNIQUE(key, session_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calculations_timestamp ON calculations(timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calculations_session ON calculations(session_id)",
        [],
    )?;

    Ok(())
}

/// Open (or create) the history database file and ensure the schema
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open history database {:?}", path))?;
    setup_database(&conn).context("Failed to initialize history schema")?;
    info!("Database initialized: {:?}", path);
    Ok(conn)
}

pub fn is_connected(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
}

// ============================================================================
// CALCULATIONS
// ============================================================================

/// Fixed-width UTC timestamps so text order is time order
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

const CALCULATION_COLUMNS: &str = "id, expression, result, timestamp, voice_input, session_id,
     user_agent, ip_address, error_message, execution_time";

fn row_to_calculation(row: &Row<'_>) -> rusqlite::Result<CalculationRecord> {
    let timestamp: String = row.get(3)?;

    Ok(CalculationRecord {
        id: row.get(0)?,
        expression: row.get(1)?,
        result: row.get(2)?,
        timestamp: parse_time(Some(timestamp)).unwrap_or_default(),
        voice_input: row.get(4)?,
        session_id: row.get(5)?,
        user_agent: row.get(6)?,
        ip_address: row.get(7)?,
        error_message: row.get(8)?,
        execution_time: row.get(9)?,
    })
}

/// Insert a calculation; returns its id
pub fn add_calculation(conn: &Connection, calc: &NewCalculation) -> Result<i64> {
    let now = now_timestamp();

    conn.execute(
        "INSERT INTO calculations (
            expression, result, timestamp, voice_input, session_id,
            user_agent, ip_address, error_message, execution_time
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            calc.expression,
            calc.result,
            now,
            calc.voice_input,
            calc.session_id,
            calc.user_agent,
            calc.ip_address,
            calc.error_message,
            calc.execution_time,
        ],
    )
    .context("Failed to insert calculation")?;

    let id = conn.last_insert_rowid();

    if let Some(session_id) = &calc.session_id {
        conn.execute(
            "UPDATE sessions
             SET calculation_count = calculation_count + 1, end_time = ?1
             WHERE session_id = ?2",
            params![now, session_id],
        )?;
    }

    info!("Added calculation to history: ID {}", id);
    Ok(id)
}

/// Newest first. `page` is 1-based; page 0 is treated as page 1.
pub fn get_history(
    conn: &Connection,
    page: u32,
    limit: u32,
    session_id: Option<&str>,
) -> Result<Vec<CalculationRecord>> {
    let offset = i64::from(page.max(1) - 1) * i64::from(limit);

    let sql = format!(
        "SELECT {} FROM calculations
         WHERE (?1 IS NULL OR session_id = ?1)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2 OFFSET ?3",
        CALCULATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map(params![session_id, i64::from(limit), offset], row_to_calculation)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn get_history_count(conn: &Connection, session_id: Option<&str>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM calculations WHERE (?1 IS NULL OR session_id = ?1)",
        params![session_id],
        |row| row.get(0),
    )?;

    Ok(count)
}

pub fn get_calculation(conn: &Connection, id: i64) -> Result<Option<CalculationRecord>> {
    let sql = format!("SELECT {} FROM calculations WHERE id = ?1", CALCULATION_COLUMNS);

    let record = conn
        .query_row(&sql, params![id], row_to_calculation)
        .optional()?;

    Ok(record)
}

/// Returns false when no row had that id
pub fn delete_calculation(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM calculations WHERE id = ?1", params![id])? > 0;

    if deleted {
        info!("Deleted calculation ID {}", id);
    }
    Ok(deleted)
}

/// Clear one session's history, or everything when no session is given
pub fn clear_history(conn: &Connection, session_id: Option<&str>) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM calculations WHERE (?1 IS NULL OR session_id = ?1)",
        params![session_id],
    )?;

    match session_id {
        Some(session) => info!("Cleared {} calculations for session {}", removed, session),
        None => info!("Cleared all calculation history ({} rows)", removed),
    }
    Ok(removed)
}

/// Full history for export, newest first
pub fn get_all_history(
    conn: &Connection,
    session_id: Option<&str>,
) -> Result<Vec<CalculationRecord>> {
    let sql = format!(
        "SELECT {} FROM calculations
         WHERE (?1 IS NULL OR session_id = ?1)
         ORDER BY timestamp DESC, id DESC",
        CALCULATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let records = stmt
        .query_map(params![session_id], row_to_calculation)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Create a session, or restart it if the id already exists
pub fn create_session(
    conn: &Connection,
    session_id: &str,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (session_id, start_time, user_agent, ip_address)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(session_id) DO UPDATE SET
            start_time = excluded.start_time,
            end_time = NULL,
            calculation_count = 0,
            user_agent = excluded.user_agent,
            ip_address = excluded.ip_address",
        params![session_id, now_timestamp(), user_agent, ip_address],
    )?;

    info!("Created session: {}", session_id);
    Ok(())
}

pub fn session_exists(conn: &Connection, session_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn get_session_stats(conn: &Connection, session_id: &str) -> Result<Option<SessionStats>> {
    let stats = conn
        .query_row(
            "SELECT s.session_id, s.start_time, s.end_time, s.calculation_count,
                    COUNT(c.id), MIN(c.timestamp), MAX(c.timestamp)
             FROM sessions s
             LEFT JOIN calculations c ON s.session_id = c.session_id
             WHERE s.session_id = ?1
             GROUP BY s.id",
            params![session_id],
            |row| {
                let start: String = row.get(1)?;
                Ok(SessionStats {
                    session_id: row.get(0)?,
                    start_time: parse_time(Some(start)).unwrap_or_default(),
                    end_time: parse_time(row.get(2)?),
                    calculation_count: row.get(3)?,
                    actual_calculation_count: row.get(4)?,
                    first_calculation: parse_time(row.get(5)?),
                    last_calculation: parse_time(row.get(6)?),
                })
            },
        )
        .optional()?;

    Ok(stats)
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Global settings overlaid with the session's own values
pub fn get_settings(
    conn: &Connection,
    session_id: Option<&str>,
) -> Result<HashMap<String, serde_json::Value>> {
    let session = session_id.unwrap_or("");
    let mut stmt = conn.prepare(
        "SELECT key, value FROM settings
         WHERE session_id = '' OR session_id = ?1
         ORDER BY session_id ASC",
    )?;

    let rows = stmt
        .query_map(params![session], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Global rows ('' sorts first) are overwritten by session rows
    let mut settings = HashMap::new();
    for (key, raw) in rows {
        let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        settings.insert(key, value);
    }

    Ok(settings)
}

pub fn set_setting(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
    session_id: Option<&str>,
) -> Result<()> {
    let value_json = serde_json::to_string(value)?;

    conn.execute(
        "INSERT INTO settings (key, value, session_id, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key, session_id) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![key, value_json, session_id.unwrap_or(""), now_timestamp()],
    )?;

    debug!("Setting {} updated", key);
    Ok(())
}

// ============================================================================
// STATISTICS
// ============================================================================

pub fn get_statistics(conn: &Connection) -> Result<HistoryStatistics> {
    let total_calculations: i64 =
        conn.query_row("SELECT COUNT(*) FROM calculations", [], |row| row.get(0))?;

    let today_prefix = format!("{}%", Utc::now().format("%Y-%m-%d"));
    let today_calculations: i64 = conn.query_row(
        "SELECT COUNT(*) FROM calculations WHERE timestamp LIKE ?1",
        params![today_prefix],
        |row| row.get(0),
    )?;

    let total_sessions: i64 =
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT expression, COUNT(*) as count
         FROM calculations
         GROUP BY expression
         ORDER BY count DESC, expression ASC
         LIMIT 10",
    )?;
    let popular_expressions = stmt
        .query_map([], |row| {
            Ok(ExpressionCount {
                expression: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HistoryStatistics {
        total_calculations,
        today_calculations,
        total_sessions,
        popular_expressions,
    })
}
