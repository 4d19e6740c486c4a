//! Clinician review — types and repository flow for resolving flagged
//! transactions.
//!
//! A transaction leaves `flagged_for_review` only through a recorded
//! decision: approve or amend moves it to `auto_accepted`, reject moves it
//! to `rejected`. Decisions on transactions that were never flagged are
//! refused.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::pipeline::gate::GateState;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("transaction {id} is not awaiting review (state: {state})")]
    NotFlagged { id: Uuid, state: GateState },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What the reviewer decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    /// Accepted after manual corrections.
    Amend,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Amend => "amend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "amend" => Some(Self::Amend),
            _ => None,
        }
    }

    /// The disposition a transaction moves to under this action.
    pub fn resulting_state(&self) -> GateState {
        match self {
            Self::Approve | Self::Amend => GateState::AutoAccepted,
            Self::Reject => GateState::Rejected,
        }
    }
}

/// One recorded review decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub action: ReviewAction,
    pub reviewer: String,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl ReviewDecision {
    pub fn new(
        transaction_id: Uuid,
        action: ReviewAction,
        reviewer: &str,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            action,
            reviewer: reviewer.to_string(),
            notes,
            decided_at: Utc::now(),
        }
    }
}

/// Result of applying a review decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub transaction_id: Uuid,
    pub previous_state: GateState,
    pub new_state: GateState,
}

/// Apply a clinician's decision to a flagged transaction.
///
/// Validates that the transaction exists and is awaiting review, records
/// the decision, and moves the stored disposition.
pub fn apply_review(
    conn: &Connection,
    transaction_id: Uuid,
    action: ReviewAction,
    reviewer: &str,
    notes: Option<String>,
) -> Result<ReviewOutcome, ReviewError> {
    let previous_state = db::repository::fetch_gate_state(conn, transaction_id)?;
    if previous_state != GateState::FlaggedForReview {
        return Err(ReviewError::NotFlagged {
            id: transaction_id,
            state: previous_state,
        });
    }

    let decision = ReviewDecision::new(transaction_id, action, reviewer, notes);
    db::repository::insert_review_decision(conn, &decision)?;

    let new_state = action.resulting_state();
    db::repository::update_gate_state(conn, transaction_id, new_state)?;

    tracing::info!(
        txn_id = %transaction_id,
        action = action.as_str(),
        new_state = new_state.as_str(),
        "Review decision applied"
    );

    Ok(ReviewOutcome {
        transaction_id,
        previous_state,
        new_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{fetch_gate_state, insert_pipeline_result};
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::result::PipelineResult;

    fn flagged_transaction(conn: &Connection) -> Uuid {
        let mut result = PipelineResult::pending(Uuid::new_v4());
        result.gate_state = GateState::FlaggedForReview;
        result.review_required = true;
        result.success = true;
        insert_pipeline_result(conn, &result).unwrap();
        result.transaction_id
    }

    #[test]
    fn approve_moves_to_auto_accepted() {
        let conn = open_memory_database().unwrap();
        let txn = flagged_transaction(&conn);

        let outcome = apply_review(&conn, txn, ReviewAction::Approve, "dr-lee", None).unwrap();
        assert_eq!(outcome.previous_state, GateState::FlaggedForReview);
        assert_eq!(outcome.new_state, GateState::AutoAccepted);
        assert_eq!(fetch_gate_state(&conn, txn).unwrap(), GateState::AutoAccepted);
    }

    #[test]
    fn reject_moves_to_rejected() {
        let conn = open_memory_database().unwrap();
        let txn = flagged_transaction(&conn);

        let outcome = apply_review(
            &conn,
            txn,
            ReviewAction::Reject,
            "dr-lee",
            Some("hallucinated medication".into()),
        )
        .unwrap();
        assert_eq!(outcome.new_state, GateState::Rejected);
    }

    #[test]
    fn amend_counts_as_acceptance() {
        let conn = open_memory_database().unwrap();
        let txn = flagged_transaction(&conn);

        let outcome = apply_review(&conn, txn, ReviewAction::Amend, "dr-lee", None).unwrap();
        assert_eq!(outcome.new_state, GateState::AutoAccepted);
    }

    #[test]
    fn decision_is_recorded() {
        let conn = open_memory_database().unwrap();
        let txn = flagged_transaction(&conn);

        apply_review(&conn, txn, ReviewAction::Approve, "dr-lee", Some("ok".into())).unwrap();

        let decisions = db::repository::fetch_review_decisions(&conn, txn).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].reviewer, "dr-lee");
        assert_eq!(decisions[0].action, ReviewAction::Approve);
    }

    #[test]
    fn review_of_accepted_transaction_is_refused() {
        let conn = open_memory_database().unwrap();
        let mut result = PipelineResult::pending(Uuid::new_v4());
        result.gate_state = GateState::AutoAccepted;
        result.success = true;
        insert_pipeline_result(&conn, &result).unwrap();

        let err = apply_review(
            &conn,
            result.transaction_id,
            ReviewAction::Approve,
            "dr-lee",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReviewError::NotFlagged { .. }));
    }

    #[test]
    fn review_of_unknown_transaction_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = apply_review(&conn, Uuid::new_v4(), ReviewAction::Approve, "dr-lee", None)
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Database(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn second_review_is_refused() {
        let conn = open_memory_database().unwrap();
        let txn = flagged_transaction(&conn);
        apply_review(&conn, txn, ReviewAction::Approve, "dr-lee", None).unwrap();

        let err = apply_review(&conn, txn, ReviewAction::Reject, "dr-wu", None).unwrap_err();
        assert!(matches!(err, ReviewError::NotFlagged { .. }));
    }
}
