//! Certificate registry: lookups, public verification, status changes and
//! expiry tracking

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    reached_alert_thresholds, Actor, Certificate, CertificateHistoryEntry, CertificateStatus,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::external::DocumentStore;
use crate::services::issuer::sha256_hex;
use crate::store::{CertificateStatusChange, CertificationStore};

/// Longest look-ahead accepted for expiring certificates
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 365;

/// Input for changing a certificate's status
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangeCertificateStatusInput {
    pub status: CertificateStatus,
    #[validate(length(min = 1, max = 5000))]
    pub reason: String,
}

/// Public view of a certificate, returned by number lookup
#[derive(Debug, Clone, Serialize)]
pub struct CertificateVerification {
    pub certificate_number: String,
    pub status: CertificateStatus,
    pub is_valid: bool,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub certifying_body: String,
    pub scope: String,
    pub crop_types: Vec<String>,
    pub farm_id: i64,
}

/// An active certificate approaching its expiry date
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringCertificate {
    pub certificate: Certificate,
    pub days_until_expiry: i64,
    /// Alert thresholds (90/60/30 days) already crossed
    pub alert_thresholds: Vec<i64>,
}

/// Certificate registry operations
#[derive(Clone)]
pub struct CertificateService {
    store: Arc<dyn CertificationStore>,
    documents: Arc<dyn DocumentStore>,
}

impl CertificateService {
    pub fn new(store: Arc<dyn CertificationStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { store, documents }
    }

    pub async fn get(&self, certificate_id: i64) -> AppResult<Certificate> {
        self.store
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))
    }

    /// Look a certificate up by its printed number
    pub async fn verify(&self, number: &str) -> AppResult<CertificateVerification> {
        let number = number.trim().to_ascii_uppercase();
        let certificate = self
            .store
            .get_certificate_by_number(&number)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate".to_string()))?;

        let today = Utc::now().date_naive();
        let is_valid =
            certificate.status == CertificateStatus::Active && !certificate.is_overdue(today);

        Ok(CertificateVerification {
            certificate_number: certificate.certificate_number,
            status: certificate.status,
            is_valid,
            issue_date: certificate.issue_date,
            expiry_date: certificate.expiry_date,
            certifying_body: certificate.certifying_body,
            scope: certificate.scope,
            crop_types: certificate.crop_types,
            farm_id: certificate.farm_id,
        })
    }

    pub async fn list_for_farm(&self, farm_id: i64) -> AppResult<Vec<Certificate>> {
        if self.store.get_farm(farm_id).await?.is_none() {
            return Err(AppError::NotFound("Farm".to_string()));
        }
        self.store.list_farm_certificates(farm_id).await
    }

    /// Fetch the stored document, checked against the digest taken at issuance
    pub async fn download_pdf(&self, certificate_id: i64) -> AppResult<(Certificate, Vec<u8>)> {
        let certificate = self.get(certificate_id).await?;
        let bytes = self.documents.get(&certificate.pdf_url).await?;

        if sha256_hex(&bytes) != certificate.pdf_sha256 {
            tracing::error!(
                certificate_id,
                "Stored document does not match the digest recorded at issuance"
            );
            return Err(AppError::StorageError(
                "Certificate document failed integrity check".to_string(),
            ));
        }

        Ok((certificate, bytes))
    }

    /// Status changes recorded for a certificate, oldest first
    pub async fn history(&self, certificate_id: i64) -> AppResult<Vec<CertificateHistoryEntry>> {
        self.get(certificate_id).await?;
        self.store.list_certificate_history(certificate_id).await
    }

    /// Move a certificate along `active -> {suspended, revoked, expired}`,
    /// `suspended -> {active, revoked}`. A suspended certificate past its
    /// expiry date cannot be reinstated.
    #[tracing::instrument(skip(self, input, actor), fields(actor = %actor, to = %input.status))]
    pub async fn change_status(
        &self,
        certificate_id: i64,
        input: ChangeCertificateStatusInput,
        actor: &Actor,
    ) -> AppResult<Certificate> {
        self.change_status_on(certificate_id, input, actor, Utc::now().date_naive())
            .await
    }

    pub async fn change_status_on(
        &self,
        certificate_id: i64,
        input: ChangeCertificateStatusInput,
        actor: &Actor,
        today: NaiveDate,
    ) -> AppResult<Certificate> {
        input.validate()?;
        if input.reason.trim().is_empty() {
            return Err(AppError::Validation {
                field: "reason".to_string(),
                message: "reason must not be blank".to_string(),
            });
        }

        let certificate = self.get(certificate_id).await?;
        let from = certificate.status;
        if !from.can_transition_to(input.status) {
            return Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: input.status.to_string(),
            });
        }
        if input.status == CertificateStatus::Active && certificate.is_past_expiry(today) {
            tracing::warn!(
                certificate_number = %certificate.certificate_number,
                expiry_date = %certificate.expiry_date,
                "Reinstatement refused past expiry"
            );
            return Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: input.status.to_string(),
            });
        }

        let reason = input.reason.trim().to_string();
        let updated = self
            .store
            .update_certificate_status(&CertificateStatusChange {
                certificate_id,
                from,
                to: input.status,
                changed_by: actor.user_id.clone(),
                reason: Some(reason.clone()),
            })
            .await?;

        match updated {
            Some(updated) => {
                tracing::info!(
                    certificate_number = %updated.certificate_number,
                    from = %from,
                    reason = %reason,
                    "Certificate status changed"
                );
                Ok(updated)
            }
            None => {
                let now = self.get(certificate_id).await?.status;
                Err(AppError::InvalidTransition {
                    from: now.to_string(),
                    to: input.status.to_string(),
                })
            }
        }
    }

    /// Mark every active certificate past its expiry date as expired
    pub async fn expire_overdue(
        &self,
        today: NaiveDate,
        actor: &Actor,
    ) -> AppResult<Vec<Certificate>> {
        let expired = self.store.expire_certificates(today, &actor.user_id).await?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue certificates");
        }
        Ok(expired)
    }

    /// Active certificates expiring within `within_days` of `today`
    pub async fn expiring(
        &self,
        today: NaiveDate,
        within_days: i64,
    ) -> AppResult<Vec<ExpiringCertificate>> {
        if !(0..=MAX_EXPIRY_WINDOW_DAYS).contains(&within_days) {
            return Err(AppError::Validation {
                field: "days".to_string(),
                message: format!("days must be between 0 and {}", MAX_EXPIRY_WINDOW_DAYS),
            });
        }

        let until = today + Duration::days(within_days);
        let certificates = self.store.list_expiring_certificates(today, until).await?;

        Ok(certificates
            .into_iter()
            .map(|certificate| {
                let days_until_expiry = certificate.days_until_expiry(today);
                ExpiringCertificate {
                    alert_thresholds: reached_alert_thresholds(days_until_expiry),
                    days_until_expiry,
                    certificate,
                }
            })
            .collect())
    }
}
