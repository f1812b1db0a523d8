//! SQLite 스키마와 쿼리
//!
//! 모든 함수는 동기이며 저장소 actor 스레드에서만 호출됩니다.

use std::path::Path;

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};

use opshub_core::types::{
    AlertRecord, ClassifiedEntry, ContainerStatus, Level, Metadata, PerformanceMetric,
    SessionEvent,
};

use super::{AlertQuery, LogQuery, PurgeCounts, SessionQuery, StoreStats};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    container_name TEXT NOT NULL,
    container_id TEXT NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    raw_log TEXT NOT NULL,
    source TEXT NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_logs_container ON logs(container_name);
CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);

CREATE TABLE IF NOT EXISTS user_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    username TEXT NOT NULL,
    model TEXT,
    action TEXT NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_timestamp ON user_sessions(timestamp);
CREATE INDEX IF NOT EXISTS idx_sessions_username ON user_sessions(username);

CREATE TABLE IF NOT EXISTS performance_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    metric_type TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    unit TEXT,
    container_name TEXT
);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON performance_metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_type ON performance_metrics(metric_type);

CREATE TABLE IF NOT EXISTS container_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    container_name TEXT NOT NULL,
    container_id TEXT NOT NULL,
    status TEXT NOT NULL,
    cpu_percent REAL,
    memory_usage_mb REAL
);
CREATE INDEX IF NOT EXISTS idx_status_timestamp ON container_status(timestamp);
CREATE INDEX IF NOT EXISTS idx_status_container ON container_status(container_name);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    container_name TEXT,
    resolved INTEGER NOT NULL DEFAULT 0,
    resolved_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
CREATE INDEX IF NOT EXISTS idx_alerts_resolved ON alerts(resolved);
";

/// 파일 데이터베이스를 열고 스키마를 생성합니다.
pub(crate) fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Task(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 인메모리 데이터베이스를 열고 스키마를 생성합니다.
pub(crate) fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn metadata_json(metadata: &Metadata) -> Result<Option<String>, StoreError> {
    if metadata.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(metadata)?))
}

fn parse_metadata(raw: Option<String>) -> Result<Metadata, StoreError> {
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(Metadata::new()),
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub(crate) fn insert_log(conn: &Connection, entry: &ClassifiedEntry) -> Result<(), StoreError> {
    let metadata = metadata_json(&entry.metadata)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO logs
         (timestamp, container_name, container_id, level, message, raw_log, source, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    stmt.execute(params![
        entry.timestamp,
        entry.source_name,
        entry.source_id,
        entry.level.as_str(),
        entry.message,
        entry.raw_log,
        entry.origin,
        metadata,
    ])?;
    Ok(())
}

pub(crate) fn insert_session(conn: &Connection, event: &SessionEvent) -> Result<(), StoreError> {
    let metadata = metadata_json(&event.metadata)?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO user_sessions (timestamp, username, model, action, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![
        event.timestamp,
        event.username,
        event.model,
        event.action,
        metadata,
    ])?;
    Ok(())
}

pub(crate) fn insert_metric(
    conn: &Connection,
    metric: &PerformanceMetric,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO performance_metrics
         (timestamp, metric_type, metric_name, value, unit, container_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    stmt.execute(params![
        metric.timestamp,
        metric.metric_type,
        metric.metric_name,
        metric.value,
        metric.unit,
        metric.container_name,
    ])?;
    Ok(())
}

pub(crate) fn insert_container_status(
    conn: &Connection,
    status: &ContainerStatus,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO container_status
         (timestamp, container_name, container_id, status, cpu_percent, memory_usage_mb)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    stmt.execute(params![
        status.timestamp,
        status.container_name,
        status.container_id,
        status.status,
        status.cpu_percent,
        status.memory_usage_mb,
    ])?;
    Ok(())
}

pub(crate) fn insert_alert(conn: &Connection, alert: &AlertRecord) -> Result<i64, StoreError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO alerts
         (timestamp, alert_type, severity, message, container_name, resolved, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    stmt.execute(params![
        alert.timestamp,
        alert.alert_type,
        alert.severity,
        alert.message,
        alert.container_name,
        alert.resolved,
        alert.resolved_at,
    ])?;
    Ok(conn.last_insert_rowid())
}

/// 미해결 알림을 해결 처리합니다. 대상이 없거나 이미 해결됐으면 `false`.
pub(crate) fn resolve_alert(
    conn: &Connection,
    id: i64,
    resolved_at: &str,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE alerts SET resolved = 1, resolved_at = ?1 WHERE id = ?2 AND resolved = 0",
        params![resolved_at, id],
    )?;
    Ok(changed > 0)
}

/// 원시 로그 행 (레벨/메타데이터 해석 전)
struct LogRow {
    timestamp: String,
    source_name: String,
    source_id: String,
    level: String,
    message: String,
    raw_log: String,
    origin: String,
    metadata: Option<String>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            timestamp: row.get(0)?,
            source_name: row.get(1)?,
            source_id: row.get(2)?,
            level: row.get(3)?,
            message: row.get(4)?,
            raw_log: row.get(5)?,
            origin: row.get(6)?,
            metadata: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<ClassifiedEntry, StoreError> {
        let level = Level::from_str_loose(&self.level).ok_or_else(|| StoreError::InvalidValue {
            column: "level".to_owned(),
            value: self.level.clone(),
        })?;
        Ok(ClassifiedEntry {
            timestamp: self.timestamp,
            source_name: self.source_name,
            source_id: self.source_id,
            level,
            message: self.message,
            raw_log: self.raw_log,
            origin: self.origin,
            metadata: parse_metadata(self.metadata)?,
        })
    }
}

pub(crate) fn query_logs(
    conn: &Connection,
    query: &LogQuery,
) -> Result<Vec<ClassifiedEntry>, StoreError> {
    let mut sql = String::from(
        "SELECT timestamp, container_name, container_id, level, message, raw_log, source, metadata
         FROM logs WHERE 1=1",
    );
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(source) = query.source.as_deref().filter(|s| *s != "all") {
        values.push(Box::new(source.to_owned()));
        sql.push_str(&format!(" AND container_name = ?{}", values.len()));
    }
    if let Some(level) = query.level {
        values.push(Box::new(level.as_str()));
        sql.push_str(&format!(" AND level = ?{}", values.len()));
    }
    if let Some(since) = &query.since {
        values.push(Box::new(since.clone()));
        sql.push_str(&format!(" AND timestamp >= ?{}", values.len()));
    }
    values.push(Box::new(limit_param(query.limit)));
    sql.push_str(&format!(
        " ORDER BY timestamp DESC, id DESC LIMIT ?{}",
        values.len()
    ));

    let value_refs: Vec<&dyn ToSql> = values.iter().map(|v| &**v).collect();
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(value_refs.as_slice(), LogRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(LogRow::into_entry).collect()
}

pub(crate) fn query_sessions(
    conn: &Connection,
    query: &SessionQuery,
) -> Result<Vec<SessionEvent>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT timestamp, username, model, action, metadata
         FROM user_sessions
         WHERE (?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR username = ?2)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            params![query.since, query.username, limit_param(query.limit)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(timestamp, username, model, action, metadata)| {
            Ok(SessionEvent {
                timestamp,
                username,
                model,
                action,
                metadata: parse_metadata(metadata)?,
            })
        })
        .collect()
}

pub(crate) fn query_alerts(
    conn: &Connection,
    query: &AlertQuery,
) -> Result<Vec<AlertRecord>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, timestamp, alert_type, severity, message, container_name, resolved, resolved_at
         FROM alerts
         WHERE (?1 IS NULL OR severity = ?1)
           AND (?2 IS NULL OR resolved = ?2)
           AND (?3 IS NULL OR timestamp >= ?3)
         ORDER BY timestamp DESC, id DESC
         LIMIT ?4",
    )?;
    let rows = stmt
        .query_map(
            params![
                query.severity,
                query.resolved,
                query.since,
                limit_param(query.limit)
            ],
            |row| {
                Ok(AlertRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    alert_type: row.get(2)?,
                    severity: row.get(3)?,
                    message: row.get(4)?,
                    container_name: row.get(5)?,
                    resolved: row.get(6)?,
                    resolved_at: row.get(7)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// 로그, 세션, 컨테이너 상태 레코드 중 `before`보다 오래된 것을 삭제합니다.
pub(crate) fn purge_records(
    conn: &mut Connection,
    before: &str,
) -> Result<PurgeCounts, StoreError> {
    let tx = conn.transaction()?;
    let logs = tx.execute("DELETE FROM logs WHERE timestamp < ?1", params![before])?;
    let sessions = tx.execute(
        "DELETE FROM user_sessions WHERE timestamp < ?1",
        params![before],
    )?;
    let container_status = tx.execute(
        "DELETE FROM container_status WHERE timestamp < ?1",
        params![before],
    )?;
    tx.commit()?;
    Ok(PurgeCounts {
        logs,
        sessions,
        container_status,
    })
}

pub(crate) fn purge_metrics(conn: &Connection, before: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM performance_metrics WHERE timestamp < ?1",
        params![before],
    )?)
}

pub(crate) fn purge_resolved_alerts(conn: &Connection, before: &str) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM alerts WHERE resolved = 1 AND resolved_at < ?1",
        params![before],
    )?)
}

pub(crate) fn stats(conn: &Connection) -> Result<StoreStats, StoreError> {
    let count = |table: &str| -> Result<u64, StoreError> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(n).unwrap_or(0))
    };
    let oldest_log: Option<String> = conn
        .query_row("SELECT MIN(timestamp) FROM logs", [], |row| {
            row.get::<_, Option<String>>(0)
        })
        .optional()?
        .flatten();

    Ok(StoreStats {
        logs: count("logs")?,
        user_sessions: count("user_sessions")?,
        performance_metrics: count("performance_metrics")?,
        container_status: count("container_status")?,
        alerts: count("alerts")?,
        oldest_log,
    })
}
