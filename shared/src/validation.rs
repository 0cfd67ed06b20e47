//! Validation utilities for the Organic Certification Platform

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::{Checklist, ChecklistAnswer, ChecklistKey};

/// Maximum length of findings, recommendations and notes
pub const MAX_FREE_TEXT_LEN: usize = 5000;

/// Maximum length of a single violation description
pub const MAX_VIOLATION_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unknown checklist key: {0}")]
    UnknownChecklistKey(String),

    #[error("Checklist incomplete, unanswered: {0:?}")]
    IncompleteChecklist(Vec<ChecklistKey>),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must not be blank")]
    Blank { field: &'static str },
}

// ============================================================================
// Checklist Validations
// ============================================================================

/// Parse raw `key -> true/false/null` answers, rejecting keys outside the fixed set
pub fn parse_checklist_answers(
    raw: &BTreeMap<String, Option<bool>>,
) -> Result<BTreeMap<ChecklistKey, ChecklistAnswer>, ValidationError> {
    raw.iter()
        .map(|(key, answer)| {
            ChecklistKey::from_str(key)
                .map(|k| (k, ChecklistAnswer::from(*answer)))
                .ok_or_else(|| ValidationError::UnknownChecklistKey(key.clone()))
        })
        .collect()
}

/// Every fixed key must carry a yes/no answer
pub fn validate_checklist_complete(checklist: &Checklist) -> Result<(), ValidationError> {
    let missing = checklist.unanswered();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::IncompleteChecklist(missing))
    }
}

// ============================================================================
// Free Text Validations
// ============================================================================

pub fn validate_free_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_FREE_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_FREE_TEXT_LEN,
        });
    }
    Ok(())
}

/// Reasons are recorded in the status history and must say something
pub fn validate_reason(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank { field: "reason" });
    }
    validate_free_text("reason", value)
}

pub fn validate_violations(violations: &[String]) -> Result<(), ValidationError> {
    for violation in violations {
        if violation.trim().is_empty() {
            return Err(ValidationError::Blank { field: "violations" });
        }
        if violation.chars().count() > MAX_VIOLATION_LEN {
            return Err(ValidationError::TooLong {
                field: "violations",
                max: MAX_VIOLATION_LEN,
            });
        }
    }
    Ok(())
}
