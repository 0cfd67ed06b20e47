//! HTTP handlers for certificate endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{Certificate, CertificateHistoryEntry};
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::inspection::pdf_response;
use crate::middleware::{check_permission, CurrentUser};
use crate::services::certificate::{
    CertificateVerification, ChangeCertificateStatusInput, ExpiringCertificate,
};
use crate::AppState;

/// Input for issuing a certificate outside the approval flow
#[derive(Debug, Deserialize, Validate)]
pub struct IssueCertificateRequest {
    #[validate(range(min = 1))]
    pub farm_id: i64,
    #[validate(range(min = 1))]
    pub inspection_id: Option<i64>,
    #[validate(length(max = 500))]
    pub scope: Option<String>,
}

/// Issue a certificate for a farm
pub async fn issue_certificate(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<IssueCertificateRequest>,
) -> AppResult<(StatusCode, Json<Certificate>)> {
    check_permission(&current_user.0, "certificates", "issue")?;
    request.validate()?;

    let issued = state
        .issuer()
        .issue(
            request.farm_id,
            request.inspection_id,
            &current_user.0.actor(),
            request.scope,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(issued.certificate)))
}

/// Get a certificate by ID
pub async fn get_certificate(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(certificate_id): Path<i64>,
) -> AppResult<Json<Certificate>> {
    check_permission(&current_user.0, "certificates", "read")?;
    let certificate = state.certificates().get(certificate_id).await?;
    Ok(Json(certificate))
}

/// Download the certificate document
pub async fn download_certificate_pdf(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(certificate_id): Path<i64>,
) -> AppResult<Response> {
    check_permission(&current_user.0, "certificates", "read")?;
    let (certificate, pdf) = state.certificates().download_pdf(certificate_id).await?;
    Ok(pdf_response(&certificate.certificate_number, pdf))
}

/// Public lookup by certificate number
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> AppResult<Json<CertificateVerification>> {
    let verification = state.certificates().verify(&number).await?;
    Ok(Json(verification))
}

/// List certificates issued to a farm, newest first
pub async fn list_farm_certificates(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(farm_id): Path<i64>,
) -> AppResult<Json<Vec<Certificate>>> {
    check_permission(&current_user.0, "certificates", "read")?;
    let certificates = state.certificates().list_for_farm(farm_id).await?;
    Ok(Json(certificates))
}

/// Suspend, reinstate, revoke or expire a certificate
pub async fn change_certificate_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(certificate_id): Path<i64>,
    Json(input): Json<ChangeCertificateStatusInput>,
) -> AppResult<Json<Certificate>> {
    check_permission(&current_user.0, "certificates", "manage")?;
    let certificate = state
        .certificates()
        .change_status(certificate_id, input, &current_user.0.actor())
        .await?;
    Ok(Json(certificate))
}

/// Status changes recorded for a certificate
pub async fn get_certificate_history(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(certificate_id): Path<i64>,
) -> AppResult<Json<Vec<CertificateHistoryEntry>>> {
    check_permission(&current_user.0, "certificates", "read")?;
    let history = state.certificates().history(certificate_id).await?;
    Ok(Json(history))
}

/// Query parameters for expiring certificates
#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

/// Active certificates expiring soon
pub async fn list_expiring_certificates(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<ExpiringCertificate>>> {
    check_permission(&current_user.0, "certificates", "read")?;
    let days = query.days.unwrap_or(90);
    let expiring = state.certificates().expiring(today(), days).await?;
    Ok(Json(expiring))
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: Vec<Certificate>,
}

/// Mark overdue certificates as expired
pub async fn expire_overdue_certificates(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ExpireResponse>> {
    check_permission(&current_user.0, "certificates", "manage")?;
    let expired = state
        .certificates()
        .expire_overdue(today(), &current_user.0.actor())
        .await?;
    Ok(Json(ExpireResponse { expired }))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
