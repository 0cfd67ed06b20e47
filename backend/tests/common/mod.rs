//! Shared fixtures for the backend integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use certification_backend::{
    config::{
        CertificationConfig, DatabaseConfig, JwtConfig, LoggingConfig, ServerConfig,
        StorageBackend, StorageConfig,
    },
    error::{AppError, AppResult},
    external::{
        CertificateFacts, CertificateRenderer, DocumentStore, MemoryDocumentStore,
        PdfCertificateRenderer,
    },
    store::{
        CertificateStatusChange, CertificationStore, InspectionRecordUpdate, MemoryStore,
        NewCertificate, NewInspection, StatusChange,
    },
    AppState, Config,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{
    Actor, Certificate, CertificateHistoryEntry, ChecklistAnswer, ChecklistKey, Farm, Farmer,
    Inspection, InspectionStatus, Inspector, StatusHistoryEntry,
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use certification_backend::services::inspection::{RecordChecklistInput, ScheduleInspectionInput};

pub const JWT_SECRET: &str = "test-secret";
pub const FARM_ID: i64 = 1;
pub const OTHER_FARM_ID: i64 = 2;
pub const INSPECTOR_ID: i64 = 10;

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        certification: CertificationConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::Local,
            local_dir: String::new(),
            http_base_url: String::new(),
            http_api_key: String::new(),
        },
        logging: LoggingConfig::default(),
    }
}

/// Application state over in-memory collaborators, with handles kept for
/// assertions
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub documents: Arc<MemoryDocumentStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(test_config(), Arc::new(PdfCertificateRenderer::new())).await
    }

    pub async fn with_renderer(renderer: Arc<dyn CertificateRenderer>) -> Self {
        Self::with(test_config(), renderer).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::with(config, Arc::new(PdfCertificateRenderer::new())).await
    }

    pub async fn with(config: Config, renderer: Arc<dyn CertificateRenderer>) -> Self {
        let store = Arc::new(MemoryStore::new());
        seed(&store).await;
        let documents = Arc::new(MemoryDocumentStore::new());

        let state = AppState::new(
            store.clone() as Arc<dyn CertificationStore>,
            documents.clone(),
            renderer,
            config,
        );

        Self {
            state,
            store,
            documents,
        }
    }

    /// Uploads take `delay` before they land in `documents`
    pub async fn with_upload_delay(config: Config, delay: Duration) -> Self {
        let mut app = Self::with_config(config).await;
        app.state.documents = Arc::new(SlowDocumentStore {
            inner: app.documents.clone(),
            delay,
        });
        app
    }

    /// Every transition to `completed` is preceded by a checklist edit
    /// written straight to the store, as a concurrent request would
    pub async fn with_edit_before_completion(edit: Vec<(ChecklistKey, ChecklistAnswer)>) -> Self {
        let mut app = Self::new().await;
        app.state.store = Arc::new(EditBeforeCompletion {
            inner: app.store.clone(),
            edit,
        });
        app
    }

    /// Schedule an inspection, record `answers`, then walk it to `completed`
    pub async fn completed_inspection(&self, farm_id: i64, answers: &[(ChecklistKey, bool)]) -> Inspection {
        let lifecycle = self.state.lifecycle();
        let actor = inspector();

        let inspection = lifecycle
            .schedule(
                ScheduleInspectionInput {
                    farm_id,
                    inspector_id: Some(INSPECTOR_ID),
                    scheduled_date: date(2026, 3, 1),
                },
                &actor,
            )
            .await
            .unwrap();

        lifecycle
            .transition_status(inspection.id, InspectionStatus::InProgress, &actor, None)
            .await
            .unwrap();

        lifecycle
            .record_checklist(inspection.id, checklist_input(answers), &actor)
            .await
            .unwrap();

        lifecycle
            .transition_status(inspection.id, InspectionStatus::Completed, &actor, None)
            .await
            .unwrap()
            .inspection
    }
}

async fn seed(store: &MemoryStore) {
    store
        .add_farmer(Farmer {
            id: 100,
            name: "Somchai Jaidee".to_string(),
            email: "somchai@example.com".to_string(),
            phone: Some("+66 81 000 0000".to_string()),
            id_number: Some("1-1001-00001-00-1".to_string()),
        })
        .await;

    for (id, name) in [(FARM_ID, "Green Valley"), (OTHER_FARM_ID, "Hill Orchard")] {
        store
            .add_farm(Farm {
                id,
                farmer_id: 100,
                name: name.to_string(),
                location: "Chiang Mai".to_string(),
                area_hectares: Decimal::new(125, 1),
                crop_types: vec!["rice".to_string(), "mango".to_string()],
            })
            .await;
    }

    store
        .add_inspector(Inspector {
            id: INSPECTOR_ID,
            name: "Inspector Lee".to_string(),
            email: "lee@example.com".to_string(),
        })
        .await;
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn inspector() -> Actor {
    Actor::new("inspector-10")
}

pub fn checklist_input(answers: &[(ChecklistKey, bool)]) -> RecordChecklistInput {
    RecordChecklistInput {
        answers: answers
            .iter()
            .map(|(key, answer)| (key.as_str().to_string(), Some(*answer)))
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

/// One "no" out of five: score 80
pub fn eligible_answers() -> Vec<(ChecklistKey, bool)> {
    vec![
        (ChecklistKey::SyntheticInputs, false),
        (ChecklistKey::BufferZones, true),
        (ChecklistKey::OrganicSeed, true),
        (ChecklistKey::CompostManagement, true),
        (ChecklistKey::RecordKeeping, true),
    ]
}

/// Two "no" out of five: score 60
pub fn ineligible_answers() -> Vec<(ChecklistKey, bool)> {
    vec![
        (ChecklistKey::SyntheticInputs, false),
        (ChecklistKey::BufferZones, false),
        (ChecklistKey::OrganicSeed, true),
        (ChecklistKey::CompostManagement, true),
        (ChecklistKey::RecordKeeping, true),
    ]
}

/// Renderer that always fails
pub struct FailingRenderer;

#[async_trait]
impl CertificateRenderer for FailingRenderer {
    async fn render(&self, _facts: &CertificateFacts) -> AppResult<Vec<u8>> {
        Err(AppError::RenderingFailure("template missing".to_string()))
    }
}

/// Renderer that takes longer than any test deadline
pub struct SlowRenderer(pub Duration);

#[async_trait]
impl CertificateRenderer for SlowRenderer {
    async fn render(&self, facts: &CertificateFacts) -> AppResult<Vec<u8>> {
        tokio::time::sleep(self.0).await;
        PdfCertificateRenderer::new().render(facts).await
    }
}

/// Document store whose uploads take `delay` before landing in `inner`
pub struct SlowDocumentStore {
    pub inner: Arc<MemoryDocumentStore>,
    pub delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowDocumentStore {
    async fn put(&self, filename: &str, bytes: &[u8]) -> AppResult<String> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(filename, bytes).await
    }

    async fn get(&self, reference: &str) -> AppResult<Vec<u8>> {
        self.inner.get(reference).await
    }

    async fn delete(&self, reference: &str) -> AppResult<()> {
        self.inner.delete(reference).await
    }
}

/// Store that slips a checklist edit in right before each `-> completed`
/// change, between the caller's read and the store's compare-and-set
pub struct EditBeforeCompletion {
    pub inner: Arc<MemoryStore>,
    pub edit: Vec<(ChecklistKey, ChecklistAnswer)>,
}

#[async_trait]
impl CertificationStore for EditBeforeCompletion {
    async fn get_farm(&self, farm_id: i64) -> AppResult<Option<Farm>> {
        self.inner.get_farm(farm_id).await
    }

    async fn get_farmer(&self, farmer_id: i64) -> AppResult<Option<Farmer>> {
        self.inner.get_farmer(farmer_id).await
    }

    async fn get_inspector(&self, inspector_id: i64) -> AppResult<Option<Inspector>> {
        self.inner.get_inspector(inspector_id).await
    }

    async fn create_inspection(&self, input: &NewInspection) -> AppResult<Inspection> {
        self.inner.create_inspection(input).await
    }

    async fn get_inspection(&self, inspection_id: i64) -> AppResult<Option<Inspection>> {
        self.inner.get_inspection(inspection_id).await
    }

    async fn update_inspection_record(
        &self,
        inspection_id: i64,
        expected_status: InspectionStatus,
        update: &InspectionRecordUpdate,
    ) -> AppResult<Option<Inspection>> {
        self.inner
            .update_inspection_record(inspection_id, expected_status, update)
            .await
    }

    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Inspection>> {
        if change.to == InspectionStatus::Completed {
            let current = self.inner.get_inspection(change.inspection_id).await?.unwrap();
            let mut checklist = current.checklist.clone();
            for (key, answer) in &self.edit {
                checklist.set(*key, *answer);
            }
            let update = InspectionRecordUpdate {
                compliance_score: Some(checklist.score()),
                checklist,
                findings: current.findings,
                recommendations: current.recommendations,
                notes: current.notes,
                violations: current.violations,
            };
            self.inner
                .update_inspection_record(change.inspection_id, change.from, &update)
                .await?
                .unwrap();
        }
        self.inner.apply_status_change(change).await
    }

    async fn commit_approval(
        &self,
        change: &StatusChange,
        certificate: &NewCertificate,
    ) -> AppResult<(Inspection, Certificate)> {
        self.inner.commit_approval(change, certificate).await
    }

    async fn list_status_history(&self, inspection_id: i64) -> AppResult<Vec<StatusHistoryEntry>> {
        self.inner.list_status_history(inspection_id).await
    }

    async fn find_active_certificate(&self, farm_id: i64) -> AppResult<Option<Certificate>> {
        self.inner.find_active_certificate(farm_id).await
    }

    async fn insert_certificate(&self, certificate: &NewCertificate) -> AppResult<Certificate> {
        self.inner.insert_certificate(certificate).await
    }

    async fn get_certificate(&self, certificate_id: i64) -> AppResult<Option<Certificate>> {
        self.inner.get_certificate(certificate_id).await
    }

    async fn get_certificate_by_number(&self, number: &str) -> AppResult<Option<Certificate>> {
        self.inner.get_certificate_by_number(number).await
    }

    async fn list_farm_certificates(&self, farm_id: i64) -> AppResult<Vec<Certificate>> {
        self.inner.list_farm_certificates(farm_id).await
    }

    async fn update_certificate_status(
        &self,
        change: &CertificateStatusChange,
    ) -> AppResult<Option<Certificate>> {
        self.inner.update_certificate_status(change).await
    }

    async fn list_certificate_history(
        &self,
        certificate_id: i64,
    ) -> AppResult<Vec<CertificateHistoryEntry>> {
        self.inner.list_certificate_history(certificate_id).await
    }

    async fn expire_certificates(
        &self,
        today: NaiveDate,
        changed_by: &str,
    ) -> AppResult<Vec<Certificate>> {
        self.inner.expire_certificates(today, changed_by).await
    }

    async fn list_expiring_certificates(
        &self,
        today: NaiveDate,
        until: NaiveDate,
    ) -> AppResult<Vec<Certificate>> {
        self.inner.list_expiring_certificates(today, until).await
    }
}
