//! PostgreSQL store tests
//!
//! These need a scratch database and are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/oc_test cargo test -p organic-certification-backend \
//!     --test postgres_tests -- --ignored
//! ```
//!
//! Every test seeds its own farmer and farm, so they can share one database.

use certification_backend::error::AppError;
use certification_backend::store::{
    CertificateStatusChange, CertificationStore, InspectionRecordUpdate, NewCertificate,
    NewInspection, PgStore, StatusChange,
};
use chrono::{Days, NaiveDate, Utc};
use shared::{CertificateStatus, Checklist, ChecklistAnswer, ChecklistKey, InspectionStatus};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    PgStore::new(pool)
}

async fn seed_farm(store: &PgStore) -> i64 {
    let farmer_id: i64 =
        sqlx::query_scalar("INSERT INTO farmers (name, email) VALUES ($1, $2) RETURNING id")
            .bind("Somchai Jaidee")
            .bind("somchai@example.com")
            .fetch_one(store.pool())
            .await
            .unwrap();

    sqlx::query_scalar(
        "INSERT INTO farms (farmer_id, name, location, crop_types) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(farmer_id)
    .bind("Green Valley")
    .bind("Chiang Mai")
    .bind(vec!["rice".to_string()])
    .fetch_one(store.pool())
    .await
    .unwrap()
}

fn new_certificate(farm_id: i64, inspection_id: Option<i64>) -> NewCertificate {
    let number = format!("ORG-TEST-{}", Uuid::new_v4().simple()).to_uppercase();
    let issue_date = Utc::now().date_naive();
    NewCertificate {
        pdf_url: format!("memory://{}.pdf", number),
        certificate_number: number,
        farm_id,
        inspection_id,
        issue_date,
        expiry_date: issue_date.checked_add_days(Days::new(365)).unwrap(),
        certifying_body: shared::CERTIFYING_BODY.to_string(),
        scope: "Vegetables".to_string(),
        crop_types: vec!["rice".to_string()],
        pdf_sha256: "00".repeat(32),
        issued_by: "tester".to_string(),
    }
}

fn transition(inspection_id: i64, from: InspectionStatus, to: InspectionStatus) -> StatusChange {
    StatusChange {
        inspection_id,
        from,
        to,
        compliance_score: None,
        score_from_checklist: false,
        inspection_date: None,
        notes: None,
        changed_by: "tester".to_string(),
        reason: None,
    }
}

fn record(checklist: Checklist) -> InspectionRecordUpdate {
    InspectionRecordUpdate {
        compliance_score: Some(checklist.score()),
        checklist,
        findings: None,
        recommendations: None,
        notes: None,
        violations: Vec::new(),
    }
}

fn all_yes() -> Checklist {
    ChecklistKey::ALL
        .iter()
        .fold(Checklist::default(), |checklist, key| checklist.with(*key, true))
}

/// An in-progress inspection carrying `checklist`
async fn in_progress_inspection(store: &PgStore, farm_id: i64, checklist: Checklist) -> i64 {
    let inspection = store
        .create_inspection(&NewInspection {
            farm_id,
            inspector_id: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            created_by: "tester".to_string(),
        })
        .await
        .unwrap();

    store
        .apply_status_change(&transition(
            inspection.id,
            InspectionStatus::Scheduled,
            InspectionStatus::InProgress,
        ))
        .await
        .unwrap()
        .unwrap();
    store
        .update_inspection_record(inspection.id, InspectionStatus::InProgress, &record(checklist))
        .await
        .unwrap()
        .unwrap();

    inspection.id
}

async fn completed_inspection(store: &PgStore, farm_id: i64) -> i64 {
    let id = in_progress_inspection(store, farm_id, all_yes()).await;
    let mut completion = transition(id, InspectionStatus::InProgress, InspectionStatus::Completed);
    completion.score_from_checklist = true;
    store.apply_status_change(&completion).await.unwrap().unwrap();
    id
}

// ============================================================================
// Inspections
// ============================================================================

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_completion_scores_the_locked_checklist() {
    let store = connect().await;
    let farm_id = seed_farm(&store).await;

    let failing = all_yes()
        .with(ChecklistKey::SyntheticInputs, false)
        .with(ChecklistKey::BufferZones, false);
    let id = in_progress_inspection(&store, farm_id, failing).await;

    let mut completion = transition(id, InspectionStatus::InProgress, InspectionStatus::Completed);
    completion.score_from_checklist = true;
    completion.compliance_score = Some(100);
    let completed = store.apply_status_change(&completion).await.unwrap().unwrap();

    assert_eq!(completed.status, InspectionStatus::Completed);
    assert_eq!(completed.compliance_score, Some(60));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_completion_with_open_checklist_writes_nothing() {
    let store = connect().await;
    let farm_id = seed_farm(&store).await;

    let mut partial = all_yes();
    partial.set(ChecklistKey::OrganicSeed, ChecklistAnswer::Unanswered);
    let id = in_progress_inspection(&store, farm_id, partial).await;

    let mut completion = transition(id, InspectionStatus::InProgress, InspectionStatus::Completed);
    completion.score_from_checklist = true;
    let result = store.apply_status_change(&completion).await;

    match result {
        Err(AppError::IncompleteChecklist { missing }) => {
            assert_eq!(missing, vec![ChecklistKey::OrganicSeed]);
        }
        other => panic!("expected IncompleteChecklist, got {:?}", other),
    }
    let stored = store.get_inspection(id).await.unwrap().unwrap();
    assert_eq!(stored.status, InspectionStatus::InProgress);
    assert_eq!(store.list_status_history(id).await.unwrap().len(), 2);
}

// ============================================================================
// Single active certificate
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_approvals_for_one_farm_commit_once() {
    let store = connect().await;
    let farm_id = seed_farm(&store).await;
    let first = completed_inspection(&store, farm_id).await;
    let second = completed_inspection(&store, farm_id).await;

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|inspection_id| {
            let store = store.clone();
            tokio::spawn(async move {
                let approval = transition(
                    inspection_id,
                    InspectionStatus::Completed,
                    InspectionStatus::Approved,
                );
                store
                    .commit_approval(&approval, &new_certificate(farm_id, Some(inspection_id)))
                    .await
            })
        })
        .collect();

    let mut approved = Vec::new();
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok((inspection, certificate)) => {
                assert_eq!(certificate.status, CertificateStatus::Active);
                approved.push(inspection.id);
            }
            Err(AppError::DuplicateCertificate { farm_id: refused }) => {
                assert_eq!(refused, farm_id);
                duplicates += 1;
            }
            Err(e) => panic!("unexpected approval error: {:?}", e),
        }
    }
    assert_eq!(approved.len(), 1);
    assert_eq!(duplicates, 1);

    // The losing inspection rolled back to `completed` with no history entry
    let loser = if approved[0] == first { second } else { first };
    let stored = store.get_inspection(loser).await.unwrap().unwrap();
    assert_eq!(stored.status, InspectionStatus::Completed);
    assert_eq!(store.list_status_history(loser).await.unwrap().len(), 3);
    assert_eq!(store.list_farm_certificates(farm_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reactivation_beside_active_certificate_is_duplicate() {
    let store = connect().await;
    let farm_id = seed_farm(&store).await;

    let first = store
        .insert_certificate(&new_certificate(farm_id, None))
        .await
        .unwrap();
    store
        .update_certificate_status(&CertificateStatusChange {
            certificate_id: first.id,
            from: CertificateStatus::Active,
            to: CertificateStatus::Suspended,
            changed_by: "admin-1".to_string(),
            reason: Some("Residue test pending".to_string()),
        })
        .await
        .unwrap()
        .unwrap();

    // Duplicate insert while one is active
    store
        .insert_certificate(&new_certificate(farm_id, None))
        .await
        .unwrap();
    assert!(matches!(
        store.insert_certificate(&new_certificate(farm_id, None)).await,
        Err(AppError::DuplicateCertificate { .. })
    ));

    let result = store
        .update_certificate_status(&CertificateStatusChange {
            certificate_id: first.id,
            from: CertificateStatus::Suspended,
            to: CertificateStatus::Active,
            changed_by: "admin-1".to_string(),
            reason: Some("Residue test clear".to_string()),
        })
        .await;
    assert!(matches!(
        result,
        Err(AppError::DuplicateCertificate { farm_id: refused }) if refused == farm_id
    ));

    // Status and history are as they were before the refused reactivation
    let stored = store.get_certificate(first.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CertificateStatus::Suspended);
    let history = store.list_certificate_history(first.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status, CertificateStatus::Suspended);
    assert_eq!(history[0].changed_by, "admin-1");
    assert_eq!(history[0].reason.as_deref(), Some("Residue test pending"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_expiry_sweep_records_history() {
    let store = connect().await;
    let farm_id = seed_farm(&store).await;

    // Dated in the past so the sweep leaves other tests' certificates alone
    let mut lapsed = new_certificate(farm_id, None);
    lapsed.issue_date = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();
    lapsed.expiry_date = NaiveDate::from_ymd_opt(2021, 1, 15).unwrap();
    let certificate = store.insert_certificate(&lapsed).await.unwrap();

    let after_expiry = certificate.expiry_date.succ_opt().unwrap();
    let expired = store.expire_certificates(after_expiry, "system").await.unwrap();
    assert!(expired.iter().any(|c| c.id == certificate.id));
    assert!(store.find_active_certificate(farm_id).await.unwrap().is_none());

    let history = store.list_certificate_history(certificate.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, CertificateStatus::Active);
    assert_eq!(history[0].new_status, CertificateStatus::Expired);
    assert_eq!(history[0].changed_by, "system");
}
