//! PostgreSQL store
//!
//! The at-most-one-active-certificate rule is enforced by the partial unique
//! index `certificates_one_active_per_farm`; a violation surfaces as
//! `DuplicateCertificate` no matter which request lost the race.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    validate_checklist_complete, Certificate, CertificateHistoryEntry, CertificateStatus,
    Checklist, Farm, Farmer, Inspection, InspectionStatus, Inspector, StatusHistoryEntry,
};
use sqlx::{PgConnection, PgPool};

use super::{
    CertificateStatusChange, CertificationStore, InspectionRecordUpdate, NewCertificate,
    NewInspection, StatusChange,
};
use crate::error::{AppError, AppResult};

const ONE_ACTIVE_PER_FARM: &str = "certificates_one_active_per_farm";

const INSPECTION_COLUMNS: &str = r#"
    id, farm_id, inspector_id, scheduled_date, inspection_date, status, checklist,
    compliance_score, findings, recommendations, notes, violations, created_at, updated_at
"#;

const CERTIFICATE_COLUMNS: &str = r#"
    id, certificate_number, farm_id, inspection_id, issue_date, expiry_date, status,
    certifying_body, scope, crop_types, pdf_url, pdf_sha256, issued_by, created_at, updated_at
"#;

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

// ============================================================================
// Row types
// ============================================================================

/// Database row for an inspection
#[derive(Debug, sqlx::FromRow)]
struct InspectionRow {
    id: i64,
    farm_id: i64,
    inspector_id: Option<i64>,
    scheduled_date: NaiveDate,
    inspection_date: Option<NaiveDate>,
    status: String,
    checklist: serde_json::Value,
    compliance_score: Option<i32>,
    findings: Option<String>,
    recommendations: Option<String>,
    notes: Option<String>,
    violations: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InspectionRow> for Inspection {
    type Error = AppError;

    fn try_from(row: InspectionRow) -> AppResult<Self> {
        let checklist = parse_checklist(row.id, row.checklist)?;

        Ok(Inspection {
            id: row.id,
            farm_id: row.farm_id,
            inspector_id: row.inspector_id,
            scheduled_date: row.scheduled_date,
            inspection_date: row.inspection_date,
            status: parse_inspection_status(&row.status)?,
            checklist,
            compliance_score: row.compliance_score,
            findings: row.findings,
            recommendations: row.recommendations,
            notes: row.notes,
            violations: row.violations,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a certificate
#[derive(Debug, sqlx::FromRow)]
struct CertificateRow {
    id: i64,
    certificate_number: String,
    farm_id: i64,
    inspection_id: Option<i64>,
    issue_date: NaiveDate,
    expiry_date: NaiveDate,
    status: String,
    certifying_body: String,
    scope: String,
    crop_types: Vec<String>,
    pdf_url: String,
    pdf_sha256: String,
    issued_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CertificateRow> for Certificate {
    type Error = AppError;

    fn try_from(row: CertificateRow) -> AppResult<Self> {
        let status = parse_certificate_status(&row.status)?;

        Ok(Certificate {
            id: row.id,
            certificate_number: row.certificate_number,
            farm_id: row.farm_id,
            inspection_id: row.inspection_id,
            issue_date: row.issue_date,
            expiry_date: row.expiry_date,
            status,
            certifying_body: row.certifying_body,
            scope: row.scope,
            crop_types: row.crop_types,
            pdf_url: row.pdf_url,
            pdf_sha256: row.pdf_sha256,
            issued_by: row.issued_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    inspection_id: i64,
    old_status: Option<String>,
    new_status: String,
    changed_by: String,
    reason: Option<String>,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> AppResult<Self> {
        Ok(StatusHistoryEntry {
            id: row.id,
            inspection_id: row.inspection_id,
            old_status: row
                .old_status
                .as_deref()
                .map(parse_inspection_status)
                .transpose()?,
            new_status: parse_inspection_status(&row.new_status)?,
            changed_by: row.changed_by,
            reason: row.reason,
            changed_at: row.changed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CertificateHistoryRow {
    id: i64,
    certificate_id: i64,
    old_status: String,
    new_status: String,
    changed_by: String,
    reason: Option<String>,
    changed_at: DateTime<Utc>,
}

impl TryFrom<CertificateHistoryRow> for CertificateHistoryEntry {
    type Error = AppError;

    fn try_from(row: CertificateHistoryRow) -> AppResult<Self> {
        Ok(CertificateHistoryEntry {
            id: row.id,
            certificate_id: row.certificate_id,
            old_status: parse_certificate_status(&row.old_status)?,
            new_status: parse_certificate_status(&row.new_status)?,
            changed_by: row.changed_by,
            reason: row.reason,
            changed_at: row.changed_at,
        })
    }
}

fn parse_certificate_status(s: &str) -> AppResult<CertificateStatus> {
    CertificateStatus::from_str(s)
        .ok_or_else(|| AppError::Internal(format!("Unknown certificate status: {}", s)))
}

fn parse_checklist(inspection_id: i64, value: serde_json::Value) -> AppResult<Checklist> {
    serde_json::from_value(value).map_err(|e| {
        AppError::Internal(format!(
            "Corrupt checklist on inspection {}: {}",
            inspection_id, e
        ))
    })
}

fn parse_inspection_status(s: &str) -> AppResult<InspectionStatus> {
    InspectionStatus::from_str(s)
        .ok_or_else(|| AppError::Internal(format!("Unknown inspection status: {}", s)))
}

fn into_certificates(rows: Vec<CertificateRow>) -> AppResult<Vec<Certificate>> {
    rows.into_iter().map(Certificate::try_from).collect()
}

fn is_one_active_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(ONE_ACTIVE_PER_FARM)
        }
        _ => false,
    }
}

// ============================================================================
// Statements shared between transactional and plain paths
// ============================================================================

async fn insert_certificate_row(
    conn: &mut PgConnection,
    input: &NewCertificate,
) -> AppResult<Certificate> {
    let sql = format!(
        r#"
        INSERT INTO certificates (
            certificate_number, farm_id, inspection_id, issue_date, expiry_date, status,
            certifying_body, scope, crop_types, pdf_url, pdf_sha256, issued_by
        )
        VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, $9, $10, $11)
        RETURNING {CERTIFICATE_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, CertificateRow>(&sql)
        .bind(&input.certificate_number)
        .bind(input.farm_id)
        .bind(input.inspection_id)
        .bind(input.issue_date)
        .bind(input.expiry_date)
        .bind(&input.certifying_body)
        .bind(&input.scope)
        .bind(&input.crop_types)
        .bind(&input.pdf_url)
        .bind(&input.pdf_sha256)
        .bind(&input.issued_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_one_active_violation(&e) {
                AppError::DuplicateCertificate {
                    farm_id: input.farm_id,
                }
            } else {
                AppError::from(e)
            }
        })?;

    row.try_into()
}

async fn append_history_row(
    conn: &mut PgConnection,
    inspection_id: i64,
    old_status: Option<InspectionStatus>,
    new_status: InspectionStatus,
    changed_by: &str,
    reason: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inspection_status_history (inspection_id, old_status, new_status, changed_by, reason)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(inspection_id)
    .bind(old_status.map(|s| s.as_str()))
    .bind(new_status.as_str())
    .bind(changed_by)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn append_certificate_history_row(
    conn: &mut PgConnection,
    certificate_id: i64,
    old_status: CertificateStatus,
    new_status: CertificateStatus,
    changed_by: &str,
    reason: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO certificate_status_history (certificate_id, old_status, new_status, changed_by, reason)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(certificate_id)
    .bind(old_status.as_str())
    .bind(new_status.as_str())
    .bind(changed_by)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Score of the locked row's checklist, once it is known to be complete.
/// `None` when the inspection has left `from`; the lock is held until the
/// surrounding transaction ends, so no checklist edit can land in between.
async fn lock_and_score_checklist(
    conn: &mut PgConnection,
    inspection_id: i64,
    from: InspectionStatus,
) -> AppResult<Option<i32>> {
    let checklist: Option<serde_json::Value> = sqlx::query_scalar(
        "SELECT checklist FROM inspections WHERE id = $1 AND status = $2 FOR UPDATE",
    )
    .bind(inspection_id)
    .bind(from.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(checklist) = checklist else {
        return Ok(None);
    };
    let checklist = parse_checklist(inspection_id, checklist)?;
    validate_checklist_complete(&checklist)?;
    Ok(Some(checklist.score()))
}

async fn apply_change_rows(
    conn: &mut PgConnection,
    change: &StatusChange,
) -> AppResult<Option<Inspection>> {
    let compliance_score = if change.score_from_checklist {
        match lock_and_score_checklist(conn, change.inspection_id, change.from).await? {
            Some(score) => Some(score),
            None => return Ok(None),
        }
    } else {
        change.compliance_score
    };

    let sql = format!(
        r#"
        UPDATE inspections SET
            status = $3,
            compliance_score = COALESCE($4, compliance_score),
            inspection_date = COALESCE(inspection_date, $5),
            notes = COALESCE($6, notes),
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING {INSPECTION_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, InspectionRow>(&sql)
        .bind(change.inspection_id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(compliance_score)
        .bind(change.inspection_date)
        .bind(&change.notes)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    append_history_row(
        conn,
        change.inspection_id,
        Some(change.from),
        change.to,
        &change.changed_by,
        change.reason.as_deref(),
    )
    .await?;

    Ok(Some(row.try_into()?))
}

#[async_trait]
impl CertificationStore for PgStore {
    async fn get_farm(&self, farm_id: i64) -> AppResult<Option<Farm>> {
        let row = sqlx::query_as::<_, (i64, i64, String, String, Decimal, Vec<String>)>(
            r#"
            SELECT id, farmer_id, name, location, area_hectares, crop_types
            FROM farms
            WHERE id = $1
            "#,
        )
        .bind(farm_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Farm {
            id: r.0,
            farmer_id: r.1,
            name: r.2,
            location: r.3,
            area_hectares: r.4,
            crop_types: r.5,
        }))
    }

    async fn get_farmer(&self, farmer_id: i64) -> AppResult<Option<Farmer>> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>, Option<String>)>(
            "SELECT id, name, email, phone, id_number FROM farmers WHERE id = $1",
        )
        .bind(farmer_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Farmer {
            id: r.0,
            name: r.1,
            email: r.2,
            phone: r.3,
            id_number: r.4,
        }))
    }

    async fn get_inspector(&self, inspector_id: i64) -> AppResult<Option<Inspector>> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, name, email FROM users WHERE id = $1",
        )
        .bind(inspector_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Inspector {
            id: r.0,
            name: r.1,
            email: r.2,
        }))
    }

    async fn create_inspection(&self, input: &NewInspection) -> AppResult<Inspection> {
        let checklist = serde_json::to_value(Checklist::default())
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let sql = format!(
            r#"
            INSERT INTO inspections (farm_id, inspector_id, scheduled_date, status, checklist)
            VALUES ($1, $2, $3, 'scheduled', $4)
            RETURNING {INSPECTION_COLUMNS}
            "#
        );

        let mut tx = self.db.begin().await?;

        let row = sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(input.farm_id)
            .bind(input.inspector_id)
            .bind(input.scheduled_date)
            .bind(&checklist)
            .fetch_one(&mut *tx)
            .await?;

        append_history_row(
            &mut tx,
            row.id,
            None,
            InspectionStatus::Scheduled,
            &input.created_by,
            None,
        )
        .await?;

        tx.commit().await?;

        row.try_into()
    }

    async fn get_inspection(&self, inspection_id: i64) -> AppResult<Option<Inspection>> {
        let sql = format!("SELECT {INSPECTION_COLUMNS} FROM inspections WHERE id = $1");

        sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(inspection_id)
            .fetch_optional(&self.db)
            .await?
            .map(Inspection::try_from)
            .transpose()
    }

    async fn update_inspection_record(
        &self,
        inspection_id: i64,
        expected_status: InspectionStatus,
        update: &InspectionRecordUpdate,
    ) -> AppResult<Option<Inspection>> {
        let checklist = serde_json::to_value(&update.checklist)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let sql = format!(
            r#"
            UPDATE inspections SET
                checklist = $3,
                compliance_score = $4,
                findings = $5,
                recommendations = $6,
                notes = $7,
                violations = $8,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {INSPECTION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, InspectionRow>(&sql)
            .bind(inspection_id)
            .bind(expected_status.as_str())
            .bind(&checklist)
            .bind(update.compliance_score)
            .bind(&update.findings)
            .bind(&update.recommendations)
            .bind(&update.notes)
            .bind(&update.violations)
            .fetch_optional(&self.db)
            .await?
            .map(Inspection::try_from)
            .transpose()
    }

    async fn apply_status_change(&self, change: &StatusChange) -> AppResult<Option<Inspection>> {
        let mut tx = self.db.begin().await?;
        let inspection = apply_change_rows(&mut tx, change).await?;
        tx.commit().await?;
        Ok(inspection)
    }

    async fn commit_approval(
        &self,
        change: &StatusChange,
        certificate: &NewCertificate,
    ) -> AppResult<(Inspection, Certificate)> {
        let mut tx = self.db.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM inspections WHERE id = $1 FOR UPDATE")
                .bind(change.inspection_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| AppError::NotFound("Inspection".to_string()))?;
        let current = parse_inspection_status(&current)?;
        if current != change.from {
            return Err(AppError::invalid_transition(current, change.to));
        }

        // Dropping `tx` on any error below rolls the whole approval back
        let certificate = insert_certificate_row(&mut tx, certificate).await?;
        let inspection = apply_change_rows(&mut tx, change)
            .await?
            .ok_or_else(|| AppError::Internal("Inspection vanished during approval".into()))?;

        tx.commit().await?;

        Ok((inspection, certificate))
    }

    async fn list_status_history(&self, inspection_id: i64) -> AppResult<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, inspection_id, old_status, new_status, changed_by, reason, changed_at
            FROM inspection_status_history
            WHERE inspection_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(inspection_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StatusHistoryEntry::try_from).collect()
    }

    async fn find_active_certificate(&self, farm_id: i64) -> AppResult<Option<Certificate>> {
        let sql = format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE farm_id = $1 AND status = 'active'"
        );

        sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(farm_id)
            .fetch_optional(&self.db)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn insert_certificate(&self, certificate: &NewCertificate) -> AppResult<Certificate> {
        let mut conn = self.db.acquire().await?;
        insert_certificate_row(&mut conn, certificate).await
    }

    async fn get_certificate(&self, certificate_id: i64) -> AppResult<Option<Certificate>> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE id = $1");

        sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(certificate_id)
            .fetch_optional(&self.db)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn get_certificate_by_number(&self, number: &str) -> AppResult<Option<Certificate>> {
        let sql =
            format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_number = $1");

        sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(number)
            .fetch_optional(&self.db)
            .await?
            .map(Certificate::try_from)
            .transpose()
    }

    async fn list_farm_certificates(&self, farm_id: i64) -> AppResult<Vec<Certificate>> {
        let sql = format!(
            r#"
            SELECT {CERTIFICATE_COLUMNS}
            FROM certificates
            WHERE farm_id = $1
            ORDER BY issue_date DESC, id DESC
            "#
        );

        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(farm_id)
            .fetch_all(&self.db)
            .await?;

        into_certificates(rows)
    }

    async fn update_certificate_status(
        &self,
        change: &CertificateStatusChange,
    ) -> AppResult<Option<Certificate>> {
        let sql = format!(
            r#"
            UPDATE certificates SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );

        let mut tx = self.db.begin().await?;

        let result = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(change.certificate_id)
            .bind(change.from.as_str())
            .bind(change.to.as_str())
            .fetch_optional(&mut *tx)
            .await;

        let row = match result {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) if is_one_active_violation(&e) => {
                // The failed statement aborted `tx`; look the farm up outside it
                drop(tx);
                let farm_id: i64 =
                    sqlx::query_scalar("SELECT farm_id FROM certificates WHERE id = $1")
                        .bind(change.certificate_id)
                        .fetch_one(&self.db)
                        .await?;
                return Err(AppError::DuplicateCertificate { farm_id });
            }
            Err(e) => return Err(e.into()),
        };

        append_certificate_history_row(
            &mut tx,
            change.certificate_id,
            change.from,
            change.to,
            &change.changed_by,
            change.reason.as_deref(),
        )
        .await?;

        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }

    async fn list_certificate_history(
        &self,
        certificate_id: i64,
    ) -> AppResult<Vec<CertificateHistoryEntry>> {
        let rows = sqlx::query_as::<_, CertificateHistoryRow>(
            r#"
            SELECT id, certificate_id, old_status, new_status, changed_by, reason, changed_at
            FROM certificate_status_history
            WHERE certificate_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(certificate_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CertificateHistoryEntry::try_from).collect()
    }

    async fn expire_certificates(
        &self,
        today: NaiveDate,
        changed_by: &str,
    ) -> AppResult<Vec<Certificate>> {
        let sql = format!(
            r#"
            UPDATE certificates SET status = 'expired', updated_at = NOW()
            WHERE status = 'active' AND expiry_date < $1
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        );

        let mut tx = self.db.begin().await?;

        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(today)
            .fetch_all(&mut *tx)
            .await?;
        let expired = into_certificates(rows)?;

        for certificate in &expired {
            let reason = format!("Expiry date {} passed", certificate.expiry_date);
            append_certificate_history_row(
                &mut tx,
                certificate.id,
                CertificateStatus::Active,
                CertificateStatus::Expired,
                changed_by,
                Some(&reason),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(expired)
    }

    async fn list_expiring_certificates(
        &self,
        today: NaiveDate,
        until: NaiveDate,
    ) -> AppResult<Vec<Certificate>> {
        let sql = format!(
            r#"
            SELECT {CERTIFICATE_COLUMNS}
            FROM certificates
            WHERE status = 'active'
              AND expiry_date >= $1
              AND expiry_date <= $2
            ORDER BY expiry_date ASC
            "#
        );

        let rows = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(today)
            .bind(until)
            .fetch_all(&self.db)
            .await?;

        into_certificates(rows)
    }
}
