//! Persistence for inspections, certificates and the records they reference
//!
//! Services receive a [`CertificationStore`] at construction; nothing in the
//! crate reaches for a process-wide connection. Every status change is a
//! compare-and-set on the expected prior status, and the status history row is
//! written in the same atomic step as the change it records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    Certificate, CertificateHistoryEntry, CertificateStatus, Checklist, Farm, Farmer, Inspection,
    InspectionStatus, Inspector, StatusHistoryEntry,
};

use crate::error::AppResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A newly scheduled inspection
#[derive(Debug, Clone)]
pub struct NewInspection {
    pub farm_id: i64,
    pub inspector_id: Option<i64>,
    pub scheduled_date: NaiveDate,
    pub created_by: String,
}

/// Replacement values for the editable part of an inspection
#[derive(Debug, Clone)]
pub struct InspectionRecordUpdate {
    pub checklist: Checklist,
    pub compliance_score: Option<i32>,
    pub findings: Option<String>,
    pub recommendations: Option<String>,
    pub notes: Option<String>,
    pub violations: Vec<String>,
}

/// One status transition together with the fields it stamps
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub inspection_id: i64,
    pub from: InspectionStatus,
    pub to: InspectionStatus,
    /// Stored score after the change, when the change recomputes it
    pub compliance_score: Option<i32>,
    /// Require the stored checklist to be complete and stamp its score, both
    /// read from the row inside the same atomic step as the status change.
    /// Takes precedence over `compliance_score`.
    pub score_from_checklist: bool,
    /// Actual inspection date, set only if not already recorded
    pub inspection_date: Option<NaiveDate>,
    /// Replacement notes
    pub notes: Option<String>,
    pub changed_by: String,
    pub reason: Option<String>,
}

/// One certificate status transition and who made it
#[derive(Debug, Clone)]
pub struct CertificateStatusChange {
    pub certificate_id: i64,
    pub from: CertificateStatus,
    pub to: CertificateStatus,
    pub changed_by: String,
    pub reason: Option<String>,
}

/// A certificate ready to be persisted, document already stored
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub certificate_number: String,
    pub farm_id: i64,
    pub inspection_id: Option<i64>,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub certifying_body: String,
    pub scope: String,
    pub crop_types: Vec<String>,
    pub pdf_url: String,
    pub pdf_sha256: String,
    pub issued_by: String,
}

/// Storage interface used by the certification services
#[async_trait]
pub trait CertificationStore: Send + Sync {
    // ==================== Registration records (read-only) ====================

    async fn get_farm(&self, farm_id: i64) -> AppResult<Option<Farm>>;

    async fn get_farmer(&self, farmer_id: i64) -> AppResult<Option<Farmer>>;

    async fn get_inspector(&self, inspector_id: i64) -> AppResult<Option<Inspector>>;

    // ==================== Inspections ====================

    /// Insert a `scheduled` inspection and its first history entry
    async fn create_inspection(&self, input: &NewInspection) -> AppResult<Inspection>;

    async fn get_inspection(&self, inspection_id: i64) -> AppResult<Option<Inspection>>;

    /// Overwrite checklist and free-text fields if the inspection is still in
    /// `expected_status`. Returns `None` when the status has moved on.
    async fn update_inspection_record(
        &self,
        inspection_id: i64,
        expected_status: InspectionStatus,
        update: &InspectionRecordUpdate,
    ) -> AppResult<Option<Inspection>>;

    /// Apply a transition and append its history entry. Returns `None` when
    /// the inspection is no longer in `change.from`. With
    /// `score_from_checklist`, fails with `IncompleteChecklist` if the stored
    /// checklist has unanswered keys; nothing is written in that case.
    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Inspection>>;

    /// Move the inspection to `approved`, insert its certificate and append the
    /// history entry as one unit. Fails with `InvalidTransition` if the
    /// inspection left `change.from`, or `DuplicateCertificate` if the farm
    /// already holds an active certificate; nothing is written in either case.
    async fn commit_approval(
        &self,
        change: &StatusChange,
        certificate: &NewCertificate,
    ) -> AppResult<(Inspection, Certificate)>;

    /// History entries in the order they were appended
    async fn list_status_history(&self, inspection_id: i64) -> AppResult<Vec<StatusHistoryEntry>>;

    // ==================== Certificates ====================

    async fn find_active_certificate(&self, farm_id: i64) -> AppResult<Option<Certificate>>;

    /// Insert an active certificate. Fails with `DuplicateCertificate` if the
    /// farm already holds one.
    async fn insert_certificate(&self, certificate: &NewCertificate) -> AppResult<Certificate>;

    async fn get_certificate(&self, certificate_id: i64) -> AppResult<Option<Certificate>>;

    async fn get_certificate_by_number(&self, number: &str) -> AppResult<Option<Certificate>>;

    async fn list_farm_certificates(&self, farm_id: i64) -> AppResult<Vec<Certificate>>;

    /// Compare-and-set on certificate status, appending its history entry in
    /// the same step. Returns `None` when the certificate is no longer in
    /// `change.from`.
    async fn update_certificate_status(
        &self,
        change: &CertificateStatusChange,
    ) -> AppResult<Option<Certificate>>;

    /// Certificate history entries in the order they were appended
    async fn list_certificate_history(
        &self,
        certificate_id: i64,
    ) -> AppResult<Vec<CertificateHistoryEntry>>;

    /// Mark every active certificate with `expiry_date < today` as expired,
    /// recording each under `changed_by`
    async fn expire_certificates(
        &self,
        today: NaiveDate,
        changed_by: &str,
    ) -> AppResult<Vec<Certificate>>;

    /// Active certificates expiring in `[today, until]`, soonest first
    async fn list_expiring_certificates(
        &self,
        today: NaiveDate,
        until: NaiveDate,
    ) -> AppResult<Vec<Certificate>>;
}
