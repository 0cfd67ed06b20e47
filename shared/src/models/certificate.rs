//! Certificate models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Name printed on every certificate as the issuing body
pub const CERTIFYING_BODY: &str = "National Organic Certification Body";

/// Days before expiration for alerts
pub const EXPIRATION_ALERT_DAYS: [i64; 3] = [90, 60, 30];

/// Status of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
    Suspended,
    RenewalPending,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Suspended => "suspended",
            CertificateStatus::RenewalPending => "renewal_pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CertificateStatus::Active),
            "expired" => Some(CertificateStatus::Expired),
            "revoked" => Some(CertificateStatus::Revoked),
            "suspended" => Some(CertificateStatus::Suspended),
            "renewal_pending" => Some(CertificateStatus::RenewalPending),
            _ => None,
        }
    }

    /// Administrative status changes. Renewal is handled elsewhere, so nothing
    /// leads into `renewal_pending` from here.
    pub fn can_transition_to(&self, next: CertificateStatus) -> bool {
        use CertificateStatus::*;

        matches!(
            (self, next),
            (Active, Suspended)
                | (Active, Revoked)
                | (Active, Expired)
                | (Suspended, Active)
                | (Suspended, Revoked)
        )
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued organic certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub certificate_number: String,
    pub farm_id: i64,
    pub inspection_id: Option<i64>,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub status: CertificateStatus,
    pub certifying_body: String,
    pub scope: String,
    pub crop_types: Vec<String>,
    pub pdf_url: String,
    pub pdf_sha256: String,
    pub issued_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    pub fn is_past_expiry(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == CertificateStatus::Active && self.is_past_expiry(today)
    }
}

/// Append-only record of one certificate status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateHistoryEntry {
    pub id: i64,
    pub certificate_id: i64,
    pub old_status: CertificateStatus,
    pub new_status: CertificateStatus,
    pub changed_by: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Alert thresholds (90/60/30 days) already reached for a certificate
pub fn reached_alert_thresholds(days_until_expiry: i64) -> Vec<i64> {
    if days_until_expiry < 0 {
        return Vec::new();
    }

    EXPIRATION_ALERT_DAYS
        .iter()
        .copied()
        .filter(|threshold| days_until_expiry <= *threshold)
        .collect()
}
