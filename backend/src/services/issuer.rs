//! Certificate issuance
//!
//! Issuance renders and uploads the document first, then persists the record.
//! If persisting fails or the issuance deadline passes, the uploaded document
//! is removed, including one whose upload was still in flight when the
//! deadline fired. An active certificate always has a retrievable document
//! and no failed attempt leaves anything behind that blocks the next one.

use chrono::Utc;
use sha2::{Digest, Sha256};
use shared::{Actor, Certificate, Inspection, InspectionStatus};
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::config::CertificationConfig;
use crate::error::{AppError, AppResult};
use crate::external::{
    CertificateFacts, CertificateRenderer, CertificateSummary, DocumentStore, FarmSummary,
    FarmerSummary, InspectionSummary,
};
use crate::services::identity::CertificateIdentity;
use crate::store::{CertificationStore, NewCertificate};

/// Who and what a certificate is being issued for
#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    pub farm_id: i64,
    pub inspection: Option<&'a Inspection>,
    pub actor: &'a Actor,
    pub scope: Option<String>,
}

/// A stored certificate together with its rendered document
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub pdf: Vec<u8>,
}

/// A rendered and uploaded certificate that has not been persisted yet
struct PreparedCertificate {
    record: NewCertificate,
    pdf: Vec<u8>,
}

/// Upload state of one issuance attempt, shared with the upload task
#[derive(Debug, Default)]
struct UploadSlot {
    /// (certificate number, document reference) stored but not yet committed
    stored: Option<(String, String)>,
    /// Set once the attempt is given up; a later upload removes its own document
    abandoned: bool,
}

type SharedUploadSlot = Arc<Mutex<UploadSlot>>;

fn lock(slot: &Mutex<UploadSlot>) -> MutexGuard<'_, UploadSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issues certificates, at most one active per farm
#[derive(Clone)]
pub struct CertificateIssuer {
    store: Arc<dyn CertificationStore>,
    documents: Arc<dyn DocumentStore>,
    renderer: Arc<dyn CertificateRenderer>,
    identity: CertificateIdentity,
    config: CertificationConfig,
}

impl CertificateIssuer {
    pub fn new(
        store: Arc<dyn CertificationStore>,
        documents: Arc<dyn DocumentStore>,
        renderer: Arc<dyn CertificateRenderer>,
        config: &CertificationConfig,
    ) -> Self {
        Self {
            store,
            documents,
            renderer,
            identity: CertificateIdentity::from_config(config),
            config: config.clone(),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.issuance_timeout_secs)
    }

    /// Issue a certificate outside the approval flow.
    ///
    /// When an inspection is named it must belong to the farm and already be
    /// approved; it only contributes its score and inspector to the document.
    #[tracing::instrument(skip(self, actor, scope), fields(actor = %actor))]
    pub async fn issue(
        &self,
        farm_id: i64,
        inspection_id: Option<i64>,
        actor: &Actor,
        scope: Option<String>,
    ) -> AppResult<IssuedCertificate> {
        let inspection = match inspection_id {
            Some(id) => Some(
                self.store
                    .get_inspection(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Inspection".to_string()))?,
            ),
            None => None,
        };

        if let Some(inspection) = &inspection {
            if inspection.farm_id != farm_id {
                return Err(AppError::Validation {
                    field: "inspection_id".to_string(),
                    message: format!(
                        "Inspection {} does not belong to farm {}",
                        inspection.id, farm_id
                    ),
                });
            }
            if inspection.status != InspectionStatus::Approved {
                return Err(AppError::invalid_transition(
                    inspection.status,
                    InspectionStatus::Approved,
                ));
            }
        }

        let request = IssueRequest {
            farm_id,
            inspection: inspection.as_ref(),
            actor,
            scope,
        };

        let store = self.store.clone();
        let (certificate, pdf) = self
            .issue_with(request, move |record| async move {
                store.insert_certificate(&record).await
            })
            .await?;

        Ok(IssuedCertificate { certificate, pdf })
    }

    /// Render, upload and hand the record to `commit` under the issuance
    /// deadline. The uploaded document is deleted unless `commit` succeeds.
    pub async fn issue_with<T, F, Fut>(
        &self,
        request: IssueRequest<'_>,
        commit: F,
    ) -> AppResult<(T, Vec<u8>)>
    where
        F: FnOnce(NewCertificate) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
    {
        let slot = SharedUploadSlot::default();

        let work = async {
            let prepared = self.prepare(&request, &slot).await?;
            let reference = prepared.record.pdf_url.clone();

            let committed = commit(prepared.record).await;
            if committed.is_err() {
                self.discard(&reference).await;
            }
            // Cleared only now, so a deadline during the discard still finds it
            lock(&slot).stored = None;
            committed.map(|value| (value, prepared.pdf))
        };

        match tokio::time::timeout(self.deadline(), work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    farm_id = request.farm_id,
                    "Certificate issuance exceeded {}s",
                    self.config.issuance_timeout_secs
                );
                let stored = {
                    let mut slot = lock(&slot);
                    slot.abandoned = true;
                    slot.stored.take()
                };
                if let Some((number, reference)) = stored {
                    self.discard_unless_committed(&number, &reference).await;
                }
                Err(AppError::Timeout("certificate issuance".to_string()))
            }
        }
    }

    /// Check the farm, gather facts, render and upload
    async fn prepare(
        &self,
        request: &IssueRequest<'_>,
        slot: &SharedUploadSlot,
    ) -> AppResult<PreparedCertificate> {
        // Fast refusal; the store enforces the same rule atomically on commit
        if self
            .store
            .find_active_certificate(request.farm_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateCertificate {
                farm_id: request.farm_id,
            });
        }

        let farm = self
            .store
            .get_farm(request.farm_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Farm".to_string()))?;
        let farmer = self
            .store
            .get_farmer(farm.farmer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Farmer".to_string()))?;

        let inspection = match request.inspection {
            Some(inspection) => {
                let inspector_name = match inspection.inspector_id {
                    Some(id) => self.store.get_inspector(id).await?.map(|i| i.name),
                    None => None,
                };
                Some(InspectionSummary {
                    compliance_score: inspection
                        .compliance_score
                        .unwrap_or_else(|| inspection.checklist.score()),
                    inspector_name,
                })
            }
            None => None,
        };

        let now = Utc::now();
        let issue_date = now.date_naive();
        let number = self.identity.generate_number(now);
        let expiry_date = self.identity.compute_expiry(issue_date)?;
        let scope = request
            .scope
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.default_scope.clone());

        let facts = CertificateFacts {
            certificate: CertificateSummary {
                number: number.clone(),
                issue_date,
                expiry_date,
                scope: scope.clone(),
                certifying_body: self.config.certifying_body.clone(),
            },
            farm: FarmSummary {
                name: farm.name.clone(),
                location: farm.location.clone(),
                area_hectares: farm.area_hectares,
                crop_types: farm.crop_types.clone(),
            },
            farmer: FarmerSummary {
                name: farmer.name,
                email: farmer.email,
                phone: farmer.phone,
                id_number: farmer.id_number,
            },
            inspection,
        };

        let pdf = self.renderer.render(&facts).await?;
        if pdf.is_empty() {
            return Err(AppError::RenderingFailure(
                "Renderer returned an empty document".to_string(),
            ));
        }
        let pdf_sha256 = sha256_hex(&pdf);

        let pdf_url = self.upload(slot, &number, &pdf).await?;

        tracing::debug!(
            farm_id = request.farm_id,
            certificate_number = %number,
            bytes = pdf.len(),
            "Certificate document stored"
        );

        Ok(PreparedCertificate {
            record: NewCertificate {
                certificate_number: number,
                farm_id: request.farm_id,
                inspection_id: request.inspection.map(|i| i.id),
                issue_date,
                expiry_date,
                certifying_body: self.config.certifying_body.clone(),
                scope,
                crop_types: farm.crop_types,
                pdf_url,
                pdf_sha256,
                issued_by: request.actor.user_id.clone(),
            },
            pdf,
        })
    }

    /// Store the document on its own task so that dropping the issuance
    /// future cannot cut an upload off half way. The reference is recorded in
    /// `slot` as soon as it exists; if the attempt was abandoned by then, the
    /// task deletes the document itself.
    async fn upload(
        &self,
        slot: &SharedUploadSlot,
        number: &str,
        pdf: &[u8],
    ) -> AppResult<String> {
        let documents = self.documents.clone();
        let slot = slot.clone();
        let number = number.to_string();
        let bytes = pdf.to_vec();

        let task = tokio::spawn(async move {
            let reference = documents.put(&format!("{}.pdf", number), &bytes).await?;

            let abandoned = {
                let mut slot = lock(&slot);
                if !slot.abandoned {
                    slot.stored = Some((number, reference.clone()));
                }
                slot.abandoned
            };
            if abandoned {
                tracing::warn!("Removing document {} uploaded after the deadline", reference);
                if let Err(e) = documents.delete(&reference).await {
                    tracing::warn!("Failed to remove late document {}: {}", reference, e);
                }
                return Err(AppError::Timeout("certificate issuance".to_string()));
            }
            Ok(reference)
        });

        task.await
            .map_err(|e| AppError::Internal(format!("Document upload task failed: {}", e)))?
    }

    async fn discard(&self, reference: &str) {
        if let Err(e) = self.documents.delete(reference).await {
            tracing::warn!("Failed to remove uncommitted document {}: {}", reference, e);
        }
    }

    /// A deadline can fire after the store accepted the record but before the
    /// reply arrived; only delete the document if no certificate carries it.
    async fn discard_unless_committed(&self, number: &str, reference: &str) {
        match self.store.get_certificate_by_number(number).await {
            Ok(Some(_)) => {}
            Ok(None) => self.discard(reference).await,
            Err(e) => tracing::warn!(
                "Keeping document {} after timeout, commit state unknown: {}",
                reference,
                e
            ),
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
