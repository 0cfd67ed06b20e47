//! HTTP handlers for inspection endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use shared::{
    is_eligible, parse_checklist_answers, Certificate, Checklist, ChecklistKey, Inspection,
    InspectionStatus, StatusHistoryEntry, ELIGIBILITY_THRESHOLD,
};
use std::collections::BTreeMap;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::inspection::{
    compute_score, RecordChecklistInput, ScheduleInspectionInput, StatusUpdate,
};
use crate::AppState;

// ============================================================================
// Scheduling and field recording
// ============================================================================

/// Schedule an inspection for a farm
pub async fn schedule_inspection(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ScheduleInspectionInput>,
) -> AppResult<(StatusCode, Json<Inspection>)> {
    check_permission(&current_user.0, "inspections", "write")?;
    let inspection = state
        .lifecycle()
        .schedule(input, &current_user.0.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(inspection)))
}

/// Get an inspection by ID
pub async fn get_inspection(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
) -> AppResult<Json<Inspection>> {
    check_permission(&current_user.0, "inspections", "read")?;
    let inspection = state.lifecycle().get(inspection_id).await?;
    Ok(Json(inspection))
}

/// Record checklist answers and notes
pub async fn record_checklist(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
    Json(input): Json<RecordChecklistInput>,
) -> AppResult<Json<Inspection>> {
    check_permission(&current_user.0, "inspections", "write")?;
    let inspection = state
        .lifecycle()
        .record_checklist(inspection_id, input, &current_user.0.actor())
        .await?;
    Ok(Json(inspection))
}

/// Status history, oldest first
pub async fn get_status_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
) -> AppResult<Json<Vec<StatusHistoryEntry>>> {
    check_permission(&current_user.0, "inspections", "read")?;
    let history = state.lifecycle().history(inspection_id).await?;
    Ok(Json(history))
}

// ============================================================================
// Status transitions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InspectionStatus,
    pub reason: Option<String>,
}

/// Move an inspection to a new status
pub async fn update_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<StatusUpdate>> {
    let action = match request.status {
        InspectionStatus::Approved | InspectionStatus::Rejected => "approve",
        _ => "write",
    };
    check_permission(&current_user.0, "inspections", action)?;

    let update = state
        .lifecycle()
        .transition_status(
            inspection_id,
            request.status,
            &current_user.0.actor(),
            request.reason,
        )
        .await?;
    Ok(Json(update))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveQuery {
    /// `pdf` streams the certificate document instead of JSON
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub inspection: Inspection,
    pub certificate: Certificate,
    pub pdf_base64: String,
}

/// Approve a completed inspection and issue its certificate
pub async fn approve_inspection(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
    Query(query): Query<ApproveQuery>,
    body: Option<Json<ApproveRequest>>,
) -> AppResult<Response> {
    check_permission(&current_user.0, "inspections", "approve")?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let outcome = state
        .lifecycle()
        .approve(inspection_id, &current_user.0.actor(), request.reason)
        .await?;

    if query.format.as_deref() == Some("pdf") {
        return Ok(pdf_response(
            &outcome.certificate.certificate_number,
            outcome.pdf,
        ));
    }

    Ok(Json(ApprovalResponse {
        inspection: outcome.inspection,
        certificate: outcome.certificate,
        pdf_base64: BASE64.encode(&outcome.pdf),
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// Reject a completed inspection
pub async fn reject_inspection(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(inspection_id): Path<i64>,
    Json(request): Json<RejectRequest>,
) -> AppResult<Json<Inspection>> {
    check_permission(&current_user.0, "inspections", "approve")?;
    let inspection = state
        .lifecycle()
        .reject(inspection_id, &current_user.0.actor(), &request.reason)
        .await?;
    Ok(Json(inspection))
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ScoreChecklistRequest {
    #[serde(default)]
    pub answers: BTreeMap<String, Option<bool>>,
}

#[derive(Debug, Serialize)]
pub struct ScoreChecklistResponse {
    pub score: i32,
    pub eligible: bool,
    pub threshold: i32,
    pub unanswered: Vec<ChecklistKey>,
}

/// Score a checklist without storing it
pub async fn score_checklist(
    current_user: CurrentUser,
    Json(request): Json<ScoreChecklistRequest>,
) -> AppResult<Json<ScoreChecklistResponse>> {
    check_permission(&current_user.0, "inspections", "read")?;

    let answers = parse_checklist_answers(&request.answers)?;
    let checklist = Checklist::from(answers);
    let score = compute_score(&checklist.items());

    Ok(Json(ScoreChecklistResponse {
        score,
        eligible: is_eligible(score),
        threshold: ELIGIBILITY_THRESHOLD,
        unanswered: checklist.unanswered(),
    }))
}

pub(crate) fn pdf_response(certificate_number: &str, pdf: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", certificate_number),
            ),
        ],
        pdf,
    )
        .into_response()
}
