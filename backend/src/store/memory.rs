//! In-memory store
//!
//! Used by the test suite and by the server when no database URL is
//! configured. All state sits behind one mutex, so every trait method is
//! atomic with respect to every other.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use shared::{
    validate_checklist_complete, Certificate, CertificateHistoryEntry, CertificateStatus,
    Checklist, Farm, Farmer, Inspection, InspectionStatus, Inspector, StatusHistoryEntry,
};
use tokio::sync::Mutex;

use super::{
    CertificateStatusChange, CertificationStore, InspectionRecordUpdate, NewCertificate,
    NewInspection, StatusChange,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    farms: HashMap<i64, Farm>,
    farmers: HashMap<i64, Farmer>,
    inspectors: HashMap<i64, Inspector>,
    inspections: BTreeMap<i64, Inspection>,
    history: Vec<StatusHistoryEntry>,
    certificates: BTreeMap<i64, Certificate>,
    certificate_history: Vec<CertificateHistoryEntry>,
    next_inspection_id: i64,
    next_history_id: i64,
    next_certificate_id: i64,
    next_certificate_history_id: i64,
}

impl MemoryState {
    fn append_history(
        &mut self,
        inspection_id: i64,
        old_status: Option<InspectionStatus>,
        new_status: InspectionStatus,
        changed_by: &str,
        reason: Option<String>,
    ) {
        self.next_history_id += 1;
        self.history.push(StatusHistoryEntry {
            id: self.next_history_id,
            inspection_id,
            old_status,
            new_status,
            changed_by: changed_by.to_string(),
            reason,
            changed_at: Utc::now(),
        });
    }

    fn append_certificate_history(
        &mut self,
        certificate_id: i64,
        old_status: CertificateStatus,
        new_status: CertificateStatus,
        changed_by: &str,
        reason: Option<String>,
    ) {
        self.next_certificate_history_id += 1;
        self.certificate_history.push(CertificateHistoryEntry {
            id: self.next_certificate_history_id,
            certificate_id,
            old_status,
            new_status,
            changed_by: changed_by.to_string(),
            reason,
            changed_at: Utc::now(),
        });
    }

    fn has_active_certificate(&self, farm_id: i64) -> bool {
        self.certificates
            .values()
            .any(|c| c.farm_id == farm_id && c.status == CertificateStatus::Active)
    }

    fn insert_certificate(&mut self, input: &NewCertificate) -> AppResult<Certificate> {
        if self.has_active_certificate(input.farm_id) {
            return Err(AppError::DuplicateCertificate {
                farm_id: input.farm_id,
            });
        }
        if self
            .certificates
            .values()
            .any(|c| c.certificate_number == input.certificate_number)
        {
            return Err(AppError::Internal(format!(
                "Certificate number {} already issued",
                input.certificate_number
            )));
        }

        self.next_certificate_id += 1;
        let now = Utc::now();
        let certificate = Certificate {
            id: self.next_certificate_id,
            certificate_number: input.certificate_number.clone(),
            farm_id: input.farm_id,
            inspection_id: input.inspection_id,
            issue_date: input.issue_date,
            expiry_date: input.expiry_date,
            status: CertificateStatus::Active,
            certifying_body: input.certifying_body.clone(),
            scope: input.scope.clone(),
            crop_types: input.crop_types.clone(),
            pdf_url: input.pdf_url.clone(),
            pdf_sha256: input.pdf_sha256.clone(),
            issued_by: input.issued_by.clone(),
            created_at: now,
            updated_at: now,
        };
        self.certificates.insert(certificate.id, certificate.clone());
        Ok(certificate)
    }

    /// Transition in place. `None` when the inspection is missing or has
    /// left `change.from`.
    fn apply_change(&mut self, change: &StatusChange) -> AppResult<Option<Inspection>> {
        let Some(inspection) = self.inspections.get_mut(&change.inspection_id) else {
            return Ok(None);
        };
        if inspection.status != change.from {
            return Ok(None);
        }

        let score = if change.score_from_checklist {
            validate_checklist_complete(&inspection.checklist)?;
            Some(inspection.checklist.score())
        } else {
            change.compliance_score
        };

        inspection.status = change.to;
        if let Some(score) = score {
            inspection.compliance_score = Some(score);
        }
        if inspection.inspection_date.is_none() {
            inspection.inspection_date = change.inspection_date;
        }
        if let Some(notes) = &change.notes {
            inspection.notes = Some(notes.clone());
        }
        inspection.updated_at = Utc::now();
        let updated = inspection.clone();

        self.append_history(
            change.inspection_id,
            Some(change.from),
            change.to,
            &change.changed_by,
            change.reason.clone(),
        );
        Ok(Some(updated))
    }
}

/// Store holding everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Registration records are owned elsewhere; these seed them.

    pub async fn add_farmer(&self, farmer: Farmer) {
        self.state.lock().await.farmers.insert(farmer.id, farmer);
    }

    pub async fn add_farm(&self, farm: Farm) {
        self.state.lock().await.farms.insert(farm.id, farm);
    }

    pub async fn add_inspector(&self, inspector: Inspector) {
        self.state.lock().await.inspectors.insert(inspector.id, inspector);
    }

    /// Number of certificates of any status held for a farm
    pub async fn certificate_count(&self, farm_id: i64) -> usize {
        self.state
            .lock()
            .await
            .certificates
            .values()
            .filter(|c| c.farm_id == farm_id)
            .count()
    }
}

#[async_trait]
impl CertificationStore for MemoryStore {
    async fn get_farm(&self, farm_id: i64) -> AppResult<Option<Farm>> {
        Ok(self.state.lock().await.farms.get(&farm_id).cloned())
    }

    async fn get_farmer(&self, farmer_id: i64) -> AppResult<Option<Farmer>> {
        Ok(self.state.lock().await.farmers.get(&farmer_id).cloned())
    }

    async fn get_inspector(&self, inspector_id: i64) -> AppResult<Option<Inspector>> {
        Ok(self.state.lock().await.inspectors.get(&inspector_id).cloned())
    }

    async fn create_inspection(&self, input: &NewInspection) -> AppResult<Inspection> {
        let mut state = self.state.lock().await;
        state.next_inspection_id += 1;
        let now = Utc::now();

        let inspection = Inspection {
            id: state.next_inspection_id,
            farm_id: input.farm_id,
            inspector_id: input.inspector_id,
            scheduled_date: input.scheduled_date,
            inspection_date: None,
            status: InspectionStatus::Scheduled,
            checklist: Checklist::default(),
            compliance_score: None,
            findings: None,
            recommendations: None,
            notes: None,
            violations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.inspections.insert(inspection.id, inspection.clone());
        state.append_history(
            inspection.id,
            None,
            InspectionStatus::Scheduled,
            &input.created_by,
            None,
        );

        Ok(inspection)
    }

    async fn get_inspection(&self, inspection_id: i64) -> AppResult<Option<Inspection>> {
        Ok(self.state.lock().await.inspections.get(&inspection_id).cloned())
    }

    async fn update_inspection_record(
        &self,
        inspection_id: i64,
        expected_status: InspectionStatus,
        update: &InspectionRecordUpdate,
    ) -> AppResult<Option<Inspection>> {
        let mut state = self.state.lock().await;
        let Some(inspection) = state.inspections.get_mut(&inspection_id) else {
            return Ok(None);
        };
        if inspection.status != expected_status {
            return Ok(None);
        }

        inspection.checklist = update.checklist.clone();
        inspection.compliance_score = update.compliance_score;
        inspection.findings = update.findings.clone();
        inspection.recommendations = update.recommendations.clone();
        inspection.notes = update.notes.clone();
        inspection.violations = update.violations.clone();
        inspection.updated_at = Utc::now();

        Ok(Some(inspection.clone()))
    }

    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Inspection>> {
        self.state.lock().await.apply_change(change)
    }

    async fn commit_approval(
        &self,
        change: &StatusChange,
        certificate: &NewCertificate,
    ) -> AppResult<(Inspection, Certificate)> {
        let mut state = self.state.lock().await;

        let current = state
            .inspections
            .get(&change.inspection_id)
            .map(|i| i.status)
            .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;
        if current != change.from {
            return Err(AppError::invalid_transition(current, change.to));
        }

        // Insert first: a duplicate must leave the inspection untouched
        let certificate = state.insert_certificate(certificate)?;
        let inspection = state
            .apply_change(change)?
            .ok_or_else(|| AppError::Internal("Inspection vanished during approval".into()))?;

        Ok((inspection, certificate))
    }

    async fn list_status_history(&self, inspection_id: i64) -> AppResult<Vec<StatusHistoryEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.inspection_id == inspection_id)
            .cloned()
            .collect())
    }

    async fn find_active_certificate(&self, farm_id: i64) -> AppResult<Option<Certificate>> {
        Ok(self
            .state
            .lock()
            .await
            .certificates
            .values()
            .find(|c| c.farm_id == farm_id && c.status == CertificateStatus::Active)
            .cloned())
    }

    async fn insert_certificate(&self, certificate: &NewCertificate) -> AppResult<Certificate> {
        self.state.lock().await.insert_certificate(certificate)
    }

    async fn get_certificate(&self, certificate_id: i64) -> AppResult<Option<Certificate>> {
        Ok(self.state.lock().await.certificates.get(&certificate_id).cloned())
    }

    async fn get_certificate_by_number(&self, number: &str) -> AppResult<Option<Certificate>> {
        Ok(self
            .state
            .lock()
            .await
            .certificates
            .values()
            .find(|c| c.certificate_number == number)
            .cloned())
    }

    async fn list_farm_certificates(&self, farm_id: i64) -> AppResult<Vec<Certificate>> {
        let state = self.state.lock().await;
        let mut certificates: Vec<Certificate> = state
            .certificates
            .values()
            .filter(|c| c.farm_id == farm_id)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| b.issue_date.cmp(&a.issue_date).then(b.id.cmp(&a.id)));
        Ok(certificates)
    }

    async fn update_certificate_status(
        &self,
        change: &CertificateStatusChange,
    ) -> AppResult<Option<Certificate>> {
        let mut state = self.state.lock().await;

        let farm_id = match state.certificates.get(&change.certificate_id) {
            Some(c) if c.status == change.from => c.farm_id,
            _ => return Ok(None),
        };
        if change.to == CertificateStatus::Active && state.has_active_certificate(farm_id) {
            return Err(AppError::DuplicateCertificate { farm_id });
        }

        let Some(certificate) = state.certificates.get_mut(&change.certificate_id) else {
            return Ok(None);
        };
        certificate.status = change.to;
        certificate.updated_at = Utc::now();
        let updated = certificate.clone();

        state.append_certificate_history(
            change.certificate_id,
            change.from,
            change.to,
            &change.changed_by,
            change.reason.clone(),
        );
        Ok(Some(updated))
    }

    async fn list_certificate_history(
        &self,
        certificate_id: i64,
    ) -> AppResult<Vec<CertificateHistoryEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .certificate_history
            .iter()
            .filter(|h| h.certificate_id == certificate_id)
            .cloned()
            .collect())
    }

    async fn expire_certificates(
        &self,
        today: NaiveDate,
        changed_by: &str,
    ) -> AppResult<Vec<Certificate>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut expired = Vec::new();
        for certificate in state.certificates.values_mut() {
            if certificate.is_overdue(today) {
                certificate.status = CertificateStatus::Expired;
                certificate.updated_at = now;
                expired.push(certificate.clone());
            }
        }
        for certificate in &expired {
            state.append_certificate_history(
                certificate.id,
                CertificateStatus::Active,
                CertificateStatus::Expired,
                changed_by,
                Some(format!("Expiry date {} passed", certificate.expiry_date)),
            );
        }
        Ok(expired)
    }

    async fn list_expiring_certificates(
        &self,
        today: NaiveDate,
        until: NaiveDate,
    ) -> AppResult<Vec<Certificate>> {
        let state = self.state.lock().await;
        let mut expiring: Vec<Certificate> = state
            .certificates
            .values()
            .filter(|c| {
                c.status == CertificateStatus::Active
                    && c.expiry_date >= today
                    && c.expiry_date <= until
            })
            .cloned()
            .collect();
        expiring.sort_by_key(|c| c.expiry_date);
        Ok(expiring)
    }
}
