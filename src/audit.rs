//! Audit event stream — one canonical event per pipeline stage.
//!
//! Every stage emits exactly one event regardless of how many physical
//! sinks consume it; delivery is at-least-once via `MultiSink` fan-out.
//! Sinks are append-only and must never fail the pipeline: write errors
//! are logged and swallowed. Event metadata carries lengths and counts
//! only, never conversation content.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::pipeline::{Stage, StageStatus};

/// One audited pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub transaction_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
    /// Stage-specific metadata: redaction counts, confidence scores,
    /// resource counts, error text.
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        transaction_id: Uuid,
        stage: Stage,
        status: StageStatus,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            transaction_id,
            stage,
            status,
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// An append-only audit event sink.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Discards every event. For tests and callers that bring no sink.
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Appends events as JSON lines to a log file.
pub struct JsonlAuditSink {
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize audit event");
                return;
            }
        };

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(error = %e, "Failed to append audit event to log file");
        }
    }
}

/// Writes events into the shared SQLite store.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
}

impl SqliteAuditSink {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run a closure against the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&conn)
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.with_connection(|conn| {
            if let Err(e) = db::repository::insert_audit_event(conn, event) {
                tracing::warn!(
                    txn_id = %event.transaction_id,
                    error = %e,
                    "Failed to persist audit event"
                );
            }
        });
    }
}

/// Fans one event out to several sinks.
pub struct MultiSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for MultiSink {
    fn record(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

/// In-memory sink capturing events for assertions.
#[cfg(test)]
pub struct MemorySink {
    pub events: Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events_for_stage(&self, stage: Stage) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.stage == stage)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
