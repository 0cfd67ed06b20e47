//! Inspection lifecycle
//!
//! `scheduled -> in_progress -> completed -> {approved | rejected}`, with
//! `cancelled` reachable from `scheduled` and `in_progress`. Every operation
//! either applies completely or leaves the inspection as it found it.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    is_eligible, parse_checklist_answers, validate_checklist_complete, validate_free_text,
    validate_reason, validate_violations, Actor, Certificate, Checklist, ChecklistItem,
    Inspection, InspectionStatus, StatusHistoryEntry, ELIGIBILITY_THRESHOLD,
};
use std::{collections::BTreeMap, sync::Arc};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::issuer::{CertificateIssuer, IssueRequest};
use crate::store::{CertificationStore, InspectionRecordUpdate, NewInspection, StatusChange};

const AUTO_APPROVAL_REASON: &str = "Approved automatically on completion";

/// Input for scheduling an inspection
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleInspectionInput {
    #[validate(range(min = 1))]
    pub farm_id: i64,
    #[validate(range(min = 1))]
    pub inspector_id: Option<i64>,
    pub scheduled_date: NaiveDate,
}

/// Checklist answers and inspection notes recorded in the field.
/// `answers` may be partial; omitted keys keep their current answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordChecklistInput {
    #[serde(default)]
    pub answers: BTreeMap<String, Option<bool>>,
    pub findings: Option<String>,
    pub recommendations: Option<String>,
    pub notes: Option<String>,
    pub violations: Option<Vec<String>>,
}

/// Result of approving an inspection
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub inspection: Inspection,
    pub certificate: Certificate,
    pub pdf: Vec<u8>,
}

/// Result of a status update; `certificate` is set when the update issued one
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub inspection: Inspection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl From<Inspection> for StatusUpdate {
    fn from(inspection: Inspection) -> Self {
        Self {
            inspection,
            certificate: None,
        }
    }
}

/// Score a checklist without touching any inspection
pub fn compute_score(items: &[ChecklistItem]) -> i32 {
    shared::compute_compliance_score(items)
}

/// Drives inspections through their status lifecycle
#[derive(Clone)]
pub struct InspectionLifecycle {
    store: Arc<dyn CertificationStore>,
    issuer: CertificateIssuer,
    auto_approve: bool,
}

impl InspectionLifecycle {
    pub fn new(
        store: Arc<dyn CertificationStore>,
        issuer: CertificateIssuer,
        auto_approve: bool,
    ) -> Self {
        Self {
            store,
            issuer,
            auto_approve,
        }
    }

    async fn load(&self, inspection_id: i64) -> AppResult<Inspection> {
        self.store
            .get_inspection(inspection_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Inspection".to_string()))
    }

    /// Status as currently stored, for reporting a lost compare-and-set
    async fn current_status(&self, inspection_id: i64) -> AppResult<InspectionStatus> {
        Ok(self.load(inspection_id).await?.status)
    }

    // ========================================================================
    // Scheduling and field recording
    // ========================================================================

    #[tracing::instrument(skip(self, input, actor), fields(farm_id = input.farm_id, actor = %actor))]
    pub async fn schedule(
        &self,
        input: ScheduleInspectionInput,
        actor: &Actor,
    ) -> AppResult<Inspection> {
        input.validate()?;

        if self.store.get_farm(input.farm_id).await?.is_none() {
            return Err(AppError::NotFound("Farm".to_string()));
        }
        if let Some(inspector_id) = input.inspector_id {
            if self.store.get_inspector(inspector_id).await?.is_none() {
                return Err(AppError::NotFound("Inspector".to_string()));
            }
        }

        let inspection = self
            .store
            .create_inspection(&NewInspection {
                farm_id: input.farm_id,
                inspector_id: input.inspector_id,
                scheduled_date: input.scheduled_date,
                created_by: actor.user_id.clone(),
            })
            .await?;

        tracing::info!(
            inspection_id = inspection.id,
            "Inspection scheduled for {}",
            inspection.scheduled_date
        );

        Ok(inspection)
    }

    pub async fn get(&self, inspection_id: i64) -> AppResult<Inspection> {
        self.load(inspection_id).await
    }

    pub async fn history(&self, inspection_id: i64) -> AppResult<Vec<StatusHistoryEntry>> {
        // Distinguish an unknown inspection from one with no history
        self.load(inspection_id).await?;
        self.store.list_status_history(inspection_id).await
    }

    /// Merge checklist answers and replace the free-text record.
    /// Only `scheduled` and `in_progress` inspections can be edited.
    #[tracing::instrument(skip(self, input, actor), fields(actor = %actor))]
    pub async fn record_checklist(
        &self,
        inspection_id: i64,
        input: RecordChecklistInput,
        actor: &Actor,
    ) -> AppResult<Inspection> {
        let answers = parse_checklist_answers(&input.answers)?;
        for (field, value) in [
            ("findings", &input.findings),
            ("recommendations", &input.recommendations),
            ("notes", &input.notes),
        ] {
            if let Some(value) = value {
                validate_free_text(field, value)?;
            }
        }
        if let Some(violations) = &input.violations {
            validate_violations(violations)?;
        }

        let inspection = self.load(inspection_id).await?;
        if !inspection.status.is_editable() {
            return Err(AppError::invalid_transition(
                inspection.status,
                inspection.status,
            ));
        }

        let mut checklist: Checklist = inspection.checklist.clone();
        checklist.merge(&answers);
        let compliance_score = if checklist.items().iter().any(|i| i.answer.is_answered()) {
            Some(checklist.score())
        } else {
            None
        };

        let update = InspectionRecordUpdate {
            checklist,
            compliance_score,
            findings: input.findings.or(inspection.findings),
            recommendations: input.recommendations.or(inspection.recommendations),
            notes: input.notes.or(inspection.notes),
            violations: input.violations.unwrap_or(inspection.violations),
        };

        match self
            .store
            .update_inspection_record(inspection_id, inspection.status, &update)
            .await?
        {
            Some(updated) => {
                tracing::debug!(score = ?updated.compliance_score, "Checklist recorded");
                Ok(updated)
            }
            None => {
                let now = self.current_status(inspection_id).await?;
                Err(AppError::invalid_transition(now, now))
            }
        }
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    /// Move an inspection to `new_status`.
    ///
    /// `approved` and `rejected` run the full approve and reject operations so
    /// the certificate side effect is never skipped.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor))]
    pub async fn transition_status(
        &self,
        inspection_id: i64,
        new_status: InspectionStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> AppResult<StatusUpdate> {
        match new_status {
            InspectionStatus::Approved => {
                let outcome = self.approve(inspection_id, actor, reason).await?;
                return Ok(StatusUpdate {
                    inspection: outcome.inspection,
                    certificate: Some(outcome.certificate),
                });
            }
            InspectionStatus::Rejected => {
                let reason = reason.unwrap_or_default();
                return Ok(self.reject(inspection_id, actor, &reason).await?.into());
            }
            _ => {}
        }

        if let Some(reason) = &reason {
            validate_free_text("reason", reason)?;
        }

        let inspection = self.load(inspection_id).await?;
        let current = inspection.status;
        if !current.can_transition_to(new_status) {
            return Err(AppError::invalid_transition(current, new_status));
        }

        let mut change = StatusChange {
            inspection_id,
            from: current,
            to: new_status,
            compliance_score: None,
            score_from_checklist: false,
            inspection_date: None,
            notes: None,
            changed_by: actor.user_id.clone(),
            reason,
        };

        match new_status {
            InspectionStatus::InProgress => {
                change.inspection_date = Some(today());
            }
            InspectionStatus::Completed => {
                // Checked again by the store against the row it transitions
                validate_checklist_complete(&inspection.checklist)?;
                change.score_from_checklist = true;
            }
            _ => {}
        }

        let updated = match self.store.apply_status_change(&change).await? {
            Some(updated) => updated,
            None => {
                let now = self.current_status(inspection_id).await?;
                return Err(AppError::invalid_transition(now, new_status));
            }
        };

        tracing::info!(
            inspection_id,
            from = %current,
            to = %new_status,
            "Inspection status changed"
        );

        if new_status == InspectionStatus::Completed && self.auto_approve {
            return Ok(self.try_auto_approve(updated, actor).await);
        }

        Ok(updated.into())
    }

    /// The completion is already stored; a failed approval leaves the
    /// inspection `completed` for an explicit approve later.
    async fn try_auto_approve(&self, completed: Inspection, actor: &Actor) -> StatusUpdate {
        let score = completed.compliance_score.unwrap_or(0);
        if !is_eligible(score) {
            return completed.into();
        }

        match self
            .approve(completed.id, actor, Some(AUTO_APPROVAL_REASON.to_string()))
            .await
        {
            Ok(outcome) => StatusUpdate {
                inspection: outcome.inspection,
                certificate: Some(outcome.certificate),
            },
            Err(e) if e.is_business_outcome() => {
                tracing::warn!(inspection_id = completed.id, "Auto-approval refused: {}", e);
                completed.into()
            }
            Err(e) => {
                tracing::error!(inspection_id = completed.id, "Auto-approval failed: {}", e);
                completed.into()
            }
        }
    }

    /// Approve a completed, eligible inspection and issue its certificate.
    ///
    /// The status change, certificate and history entry are committed
    /// together; on any failure the inspection stays `completed`.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor))]
    pub async fn approve(
        &self,
        inspection_id: i64,
        actor: &Actor,
        reason: Option<String>,
    ) -> AppResult<ApprovalOutcome> {
        if let Some(reason) = &reason {
            validate_free_text("reason", reason)?;
        }

        let inspection = self.load(inspection_id).await?;
        if inspection.status != InspectionStatus::Completed {
            return Err(AppError::invalid_transition(
                inspection.status,
                InspectionStatus::Approved,
            ));
        }

        // The checklist is frozen once completed
        let score = inspection.checklist.score();
        if !is_eligible(score) {
            tracing::warn!(inspection_id, score, "Approval refused below threshold");
            return Err(AppError::BelowThreshold {
                score,
                required: ELIGIBILITY_THRESHOLD,
            });
        }

        let change = StatusChange {
            inspection_id,
            from: InspectionStatus::Completed,
            to: InspectionStatus::Approved,
            compliance_score: Some(score),
            score_from_checklist: false,
            inspection_date: None,
            notes: None,
            changed_by: actor.user_id.clone(),
            reason,
        };

        let request = IssueRequest {
            farm_id: inspection.farm_id,
            inspection: Some(&inspection),
            actor,
            scope: None,
        };

        let store = self.store.clone();
        let ((approved, certificate), pdf) = self
            .issuer
            .issue_with(request, move |record| async move {
                store.commit_approval(&change, &record).await
            })
            .await?;

        tracing::info!(
            inspection_id,
            farm_id = approved.farm_id,
            certificate_number = %certificate.certificate_number,
            expiry_date = %certificate.expiry_date,
            "Inspection approved, certificate issued"
        );

        Ok(ApprovalOutcome {
            inspection: approved,
            certificate,
            pdf,
        })
    }

    /// Reject a completed inspection. The reason is appended to its notes.
    #[tracing::instrument(skip(self, actor, reason), fields(actor = %actor))]
    pub async fn reject(
        &self,
        inspection_id: i64,
        actor: &Actor,
        reason: &str,
    ) -> AppResult<Inspection> {
        validate_reason(reason)?;

        let inspection = self.load(inspection_id).await?;
        if inspection.status != InspectionStatus::Completed {
            return Err(AppError::invalid_transition(
                inspection.status,
                InspectionStatus::Rejected,
            ));
        }

        let reason = reason.trim();
        let entry = format!("Rejected: {}", reason);
        let notes = match inspection.notes.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{}\n{}", existing, entry),
            _ => entry,
        };

        let change = StatusChange {
            inspection_id,
            from: InspectionStatus::Completed,
            to: InspectionStatus::Rejected,
            compliance_score: None,
            score_from_checklist: false,
            inspection_date: None,
            notes: Some(notes),
            changed_by: actor.user_id.clone(),
            reason: Some(reason.to_string()),
        };

        match self.store.apply_status_change(&change).await? {
            Some(rejected) => {
                tracing::info!(inspection_id, "Inspection rejected");
                Ok(rejected)
            }
            None => {
                let now = self.current_status(inspection_id).await?;
                Err(AppError::invalid_transition(now, InspectionStatus::Rejected))
            }
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
