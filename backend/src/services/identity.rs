//! Certificate numbering and validity

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::config::CertificationConfig;
use crate::error::{AppError, AppResult};

const RANDOM_SUFFIX_LEN: u32 = 4;

/// Generates certificate numbers and expiry dates
#[derive(Debug, Clone)]
pub struct CertificateIdentity {
    prefix: String,
    validity_months: u32,
}

impl CertificateIdentity {
    pub fn new(prefix: impl Into<String>, validity_months: u32) -> Self {
        Self {
            prefix: prefix.into().to_ascii_uppercase(),
            validity_months,
        }
    }

    pub fn from_config(config: &CertificationConfig) -> Self {
        Self::new(config.number_prefix.clone(), config.validity_months)
    }

    /// `<PREFIX>-<year>-<base36 millis><4 random base36 chars>`, uppercase.
    ///
    /// Uniqueness is probabilistic; the `certificate_number` column is unique
    /// so a collision fails the insert instead of producing two certificates
    /// with one number.
    pub fn generate_number(&self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis().max(0) as u128;
        let random = uuid::Uuid::new_v4().as_u128() % 36u128.pow(RANDOM_SUFFIX_LEN);

        format!(
            "{}-{}-{}{:0>width$}",
            self.prefix,
            now.year(),
            to_base36(millis),
            to_base36(random),
            width = RANDOM_SUFFIX_LEN as usize
        )
    }

    pub fn compute_expiry(&self, issue_date: NaiveDate) -> AppResult<NaiveDate> {
        compute_expiry(issue_date, self.validity_months)
    }

    pub fn validity_months(&self) -> u32 {
        self.validity_months
    }
}

/// `issue_date` plus `validity_months` calendar months. A day missing from the
/// target month clamps to its last day (Feb 29 + 12 months = Feb 28).
pub fn compute_expiry(issue_date: NaiveDate, validity_months: u32) -> AppResult<NaiveDate> {
    if validity_months == 0 {
        return Err(AppError::Configuration(
            "certification.validity_months must be positive".to_string(),
        ));
    }

    issue_date
        .checked_add_months(Months::new(validity_months))
        .ok_or_else(|| AppError::Internal(format!("Expiry out of range for {}", issue_date)))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
