//! Repository functions over the SQLite store.
//!
//! The store holds three things per transaction: the full pipeline result
//! (as JSON, plus indexed columns for querying), the audit event stream,
//! and any clinician review decisions.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DatabaseError;
use crate::audit::AuditEvent;
use crate::pipeline::gate::GateState;
use crate::pipeline::{PipelineResult, Stage, StageStatus};
use crate::review::{ReviewAction, ReviewDecision};

/// Persist a completed (or failed) pipeline result.
pub fn insert_pipeline_result(
    conn: &Connection,
    result: &PipelineResult,
) -> Result<(), DatabaseError> {
    let result_json = serde_json::to_string(result)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let overall_confidence = result
        .outputs
        .as_ref()
        .map(|o| o.structured_clinical_data.overall_confidence as i64);
    let validation_passed = result.validation.as_ref().map(|v| v.passed);

    conn.execute(
        "INSERT INTO pipeline_results (transaction_id, success, gate_state,
         overall_confidence, validation_passed, review_required, result_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.transaction_id.to_string(),
            result.success,
            result.gate_state.as_str(),
            overall_confidence,
            validation_passed,
            result.review_required,
            result_json,
            Utc::now().to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Fetch a stored result by transaction id.
pub fn fetch_pipeline_result(
    conn: &Connection,
    transaction_id: Uuid,
) -> Result<PipelineResult, DatabaseError> {
    let result_json: Option<String> = conn
        .query_row(
            "SELECT result_json FROM pipeline_results WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let result_json = result_json.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "pipeline_result".into(),
        id: transaction_id.to_string(),
    })?;

    serde_json::from_str(&result_json).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// The gate state currently stored for a transaction.
/// Reflects review decisions, unlike the frozen `result_json`.
pub fn fetch_gate_state(
    conn: &Connection,
    transaction_id: Uuid,
) -> Result<GateState, DatabaseError> {
    let state: Option<String> = conn
        .query_row(
            "SELECT gate_state FROM pipeline_results WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let state = state.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "pipeline_result".into(),
        id: transaction_id.to_string(),
    })?;

    GateState::from_str(&state).ok_or(DatabaseError::InvalidEnum {
        field: "gate_state".into(),
        value: state,
    })
}

/// Move a transaction to a new disposition (review outcomes).
pub fn update_gate_state(
    conn: &Connection,
    transaction_id: Uuid,
    state: GateState,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE pipeline_results SET gate_state = ?1, review_required = ?2
         WHERE transaction_id = ?3",
        params![
            state.as_str(),
            state == GateState::FlaggedForReview,
            transaction_id.to_string(),
        ],
    )?;

    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "pipeline_result".into(),
            id: transaction_id.to_string(),
        });
    }
    Ok(())
}

/// Summary row for the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedNote {
    pub transaction_id: Uuid,
    pub overall_confidence: Option<u8>,
    pub created_at: String,
}

/// Transactions waiting for review, lowest confidence first.
pub fn list_flagged(conn: &Connection, limit: usize) -> Result<Vec<FlaggedNote>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT transaction_id, overall_confidence, created_at FROM pipeline_results
         WHERE gate_state = 'flagged_for_review'
         ORDER BY overall_confidence ASC, created_at DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut notes = Vec::new();
    for row in rows {
        let (txn, confidence, created_at) = row?;
        let transaction_id = Uuid::parse_str(&txn).map_err(|_| DatabaseError::InvalidEnum {
            field: "transaction_id".into(),
            value: txn,
        })?;
        notes.push(FlaggedNote {
            transaction_id,
            overall_confidence: confidence.map(|c| c as u8),
            created_at,
        });
    }
    Ok(notes)
}

/// Append one audit event.
pub fn insert_audit_event(conn: &Connection, event: &AuditEvent) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&event.metadata)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT INTO audit_events (transaction_id, stage, status, timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.transaction_id.to_string(),
            event.stage.as_str(),
            event.status.as_str(),
            event.timestamp.to_rfc3339(),
            metadata,
        ],
    )?;
    Ok(())
}

/// All audit events for a transaction, in insertion order.
pub fn fetch_audit_events(
    conn: &Connection,
    transaction_id: Uuid,
) -> Result<Vec<AuditEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT transaction_id, stage, status, timestamp, metadata FROM audit_events
         WHERE transaction_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![transaction_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (txn, stage, status, timestamp, metadata) = row?;
        events.push(AuditEvent {
            transaction_id: Uuid::parse_str(&txn).map_err(|_| DatabaseError::InvalidEnum {
                field: "transaction_id".into(),
                value: txn,
            })?,
            stage: Stage::from_str(&stage).ok_or(DatabaseError::InvalidEnum {
                field: "stage".into(),
                value: stage,
            })?,
            status: StageStatus::from_str(&status).ok_or(DatabaseError::InvalidEnum {
                field: "status".into(),
                value: status,
            })?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?
                .with_timezone(&Utc),
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        });
    }
    Ok(events)
}

/// Record a clinician's review decision.
pub fn insert_review_decision(
    conn: &Connection,
    decision: &ReviewDecision,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO review_decisions (id, transaction_id, action, reviewer, notes, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            decision.id.to_string(),
            decision.transaction_id.to_string(),
            decision.action.as_str(),
            decision.reviewer,
            decision.notes,
            decision.decided_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Review history for a transaction, oldest first.
pub fn fetch_review_decisions(
    conn: &Connection,
    transaction_id: Uuid,
) -> Result<Vec<ReviewDecision>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, transaction_id, action, reviewer, notes, decided_at FROM review_decisions
         WHERE transaction_id = ?1 ORDER BY decided_at ASC",
    )?;

    let rows = stmt.query_map(params![transaction_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut decisions = Vec::new();
    for row in rows {
        let (id, txn, action, reviewer, notes, decided_at) = row?;
        decisions.push(ReviewDecision {
            id: Uuid::parse_str(&id).map_err(|_| DatabaseError::InvalidEnum {
                field: "id".into(),
                value: id,
            })?,
            transaction_id: Uuid::parse_str(&txn).map_err(|_| DatabaseError::InvalidEnum {
                field: "transaction_id".into(),
                value: txn,
            })?,
            action: ReviewAction::from_str(&action).ok_or(DatabaseError::InvalidEnum {
                field: "action".into(),
                value: action,
            })?,
            reviewer,
            notes,
            decided_at: DateTime::parse_from_rfc3339(&decided_at)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?
                .with_timezone(&Utc),
        });
    }
    Ok(decisions)
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_results: i64,
    pub flagged_for_review: i64,
    pub reviewed: i64,
    pub approvals: i64,
}

impl StoreStatistics {
    pub fn approval_rate(&self) -> f64 {
        if self.reviewed == 0 {
            return 0.0;
        }
        self.approvals as f64 / self.reviewed as f64
    }
}

pub fn statistics(conn: &Connection) -> Result<StoreStatistics, DatabaseError> {
    let total_results =
        conn.query_row("SELECT COUNT(*) FROM pipeline_results", [], |r| r.get(0))?;
    let flagged_for_review = conn.query_row(
        "SELECT COUNT(*) FROM pipeline_results WHERE gate_state = 'flagged_for_review'",
        [],
        |r| r.get(0),
    )?;
    let reviewed = conn.query_row(
        "SELECT COUNT(DISTINCT transaction_id) FROM review_decisions",
        [],
        |r| r.get(0),
    )?;
    let approvals = conn.query_row(
        "SELECT COUNT(*) FROM review_decisions WHERE action = 'approve'",
        [],
        |r| r.get(0),
    )?;

    Ok(StoreStatistics {
        total_results,
        flagged_for_review,
        reviewed,
        approvals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::result::PipelineResult;

    fn stored_result(gate_state: GateState, confidence: Option<u8>) -> PipelineResult {
        let mut result = PipelineResult::pending(Uuid::new_v4());
        result.gate_state = gate_state;
        result.review_required = gate_state == GateState::FlaggedForReview;
        result.success = gate_state != GateState::Rejected;
        if let Some(c) = confidence {
            // A minimal outputs block carrying the confidence
            let entities = crate::pipeline::extraction::parse_clinical_note(
                &crate::pipeline::extraction::schema::tests::sample_note_json()
                    .replace(r#""overall_confidence": 88"#, &format!(r#""overall_confidence": {c}"#)),
            )
            .unwrap();
            let resources =
                crate::pipeline::fhir::build_resources(&entities, Utc::now());
            let bundle =
                crate::pipeline::fhir::assemble(result.transaction_id, resources, Utc::now());
            result.outputs = Some(crate::pipeline::result::PipelineOutputs {
                masked_conversation: "[PATIENT_NAME] reports chest pain.".into(),
                structured_clinical_data: entities,
                fhir_bundle: bundle,
            });
        }
        result
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let conn = open_memory_database().unwrap();
        let result = stored_result(GateState::AutoAccepted, Some(90));
        insert_pipeline_result(&conn, &result).unwrap();

        let fetched = fetch_pipeline_result(&conn, result.transaction_id).unwrap();
        assert_eq!(fetched.transaction_id, result.transaction_id);
        assert_eq!(fetched.gate_state, GateState::AutoAccepted);
        assert_eq!(
            fetched
                .outputs
                .unwrap()
                .structured_clinical_data
                .overall_confidence,
            90
        );
    }

    #[test]
    fn fetch_unknown_transaction_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = fetch_pipeline_result(&conn, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn flagged_queue_ordered_by_confidence() {
        let conn = open_memory_database().unwrap();
        let low = stored_result(GateState::FlaggedForReview, Some(55));
        let lower = stored_result(GateState::FlaggedForReview, Some(40));
        let accepted = stored_result(GateState::AutoAccepted, Some(95));
        insert_pipeline_result(&conn, &low).unwrap();
        insert_pipeline_result(&conn, &lower).unwrap();
        insert_pipeline_result(&conn, &accepted).unwrap();

        let flagged = list_flagged(&conn, 10).unwrap();
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].transaction_id, lower.transaction_id);
        assert_eq!(flagged[0].overall_confidence, Some(40));
        assert_eq!(flagged[1].transaction_id, low.transaction_id);
    }

    #[test]
    fn gate_state_update_round_trips() {
        let conn = open_memory_database().unwrap();
        let result = stored_result(GateState::FlaggedForReview, Some(60));
        insert_pipeline_result(&conn, &result).unwrap();

        update_gate_state(&conn, result.transaction_id, GateState::AutoAccepted).unwrap();
        assert_eq!(
            fetch_gate_state(&conn, result.transaction_id).unwrap(),
            GateState::AutoAccepted
        );
        assert!(list_flagged(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn update_unknown_transaction_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = update_gate_state(&conn, Uuid::new_v4(), GateState::AutoAccepted).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn audit_events_round_trip_in_order() {
        let conn = open_memory_database().unwrap();
        let txn = Uuid::new_v4();

        for (stage, status) in [
            (Stage::Deidentification, StageStatus::Success),
            (Stage::Extraction, StageStatus::Failed),
        ] {
            insert_audit_event(
                &conn,
                &AuditEvent::new(txn, stage, status, serde_json::json!({"k": 1})),
            )
            .unwrap();
        }

        let events = fetch_audit_events(&conn, txn).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, Stage::Deidentification);
        assert_eq!(events[1].stage, Stage::Extraction);
        assert_eq!(events[1].status, StageStatus::Failed);
        assert_eq!(events[0].metadata["k"], 1);
    }

    #[test]
    fn statistics_count_reviews_and_approvals() {
        let conn = open_memory_database().unwrap();
        let flagged = stored_result(GateState::FlaggedForReview, Some(50));
        insert_pipeline_result(&conn, &flagged).unwrap();
        insert_pipeline_result(&conn, &stored_result(GateState::AutoAccepted, Some(92))).unwrap();

        insert_review_decision(
            &conn,
            &ReviewDecision::new(flagged.transaction_id, ReviewAction::Approve, "dr-reviewer", None),
        )
        .unwrap();

        let stats = statistics(&conn).unwrap();
        assert_eq!(stats.total_results, 2);
        assert_eq!(stats.flagged_for_review, 1);
        assert_eq!(stats.reviewed, 1);
        assert_eq!(stats.approvals, 1);
        assert!((stats.approval_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn review_decisions_round_trip() {
        let conn = open_memory_database().unwrap();
        let result = stored_result(GateState::FlaggedForReview, Some(50));
        insert_pipeline_result(&conn, &result).unwrap();

        let decision = ReviewDecision::new(
            result.transaction_id,
            ReviewAction::Amend,
            "dr-reviewer",
            Some("corrected dosage".into()),
        );
        insert_review_decision(&conn, &decision).unwrap();

        let decisions = fetch_review_decisions(&conn, result.transaction_id).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, ReviewAction::Amend);
        assert_eq!(decisions[0].notes.as_deref(), Some("corrected dosage"));
    }
}
