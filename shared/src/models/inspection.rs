//! Inspection models and status lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Checklist;

/// Inspection status
///
/// `scheduled → in_progress → completed → {approved | rejected}`, with
/// `cancelled` reachable from `scheduled` or `in_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Scheduled,
    InProgress,
    Completed,
    Approved,
    Rejected,
    Cancelled,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Scheduled => "scheduled",
            InspectionStatus::InProgress => "in_progress",
            InspectionStatus::Completed => "completed",
            InspectionStatus::Approved => "approved",
            InspectionStatus::Rejected => "rejected",
            InspectionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(InspectionStatus::Scheduled),
            "in_progress" => Some(InspectionStatus::InProgress),
            "completed" => Some(InspectionStatus::Completed),
            "approved" => Some(InspectionStatus::Approved),
            "rejected" => Some(InspectionStatus::Rejected),
            "cancelled" => Some(InspectionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InspectionStatus::Approved | InspectionStatus::Rejected | InspectionStatus::Cancelled
        )
    }

    /// Whether the checklist and free-text fields may still be edited
    pub fn is_editable(&self) -> bool {
        matches!(self, InspectionStatus::Scheduled | InspectionStatus::InProgress)
    }

    pub fn can_transition_to(&self, next: InspectionStatus) -> bool {
        use InspectionStatus::*;

        matches!(
            (self, next),
            (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, Approved)
                | (Completed, Rejected)
        )
    }
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled or conducted farm inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: i64,
    pub farm_id: i64,
    pub inspector_id: Option<i64>,
    pub scheduled_date: NaiveDate,
    pub inspection_date: Option<NaiveDate>,
    pub status: InspectionStatus,
    pub checklist: Checklist,
    pub compliance_score: Option<i32>,
    pub findings: Option<String>,
    pub recommendations: Option<String>,
    pub notes: Option<String>,
    pub violations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub inspection_id: i64,
    pub old_status: Option<InspectionStatus>,
    pub new_status: InspectionStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}
