//! Certificate document rendering
//!
//! The renderer receives every fact printed on a certificate and returns the
//! PDF bytes: one A4 page of text.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

use crate::error::{AppError, AppResult};

/// Certificate identity printed on the document
#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub number: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub scope: String,
    pub certifying_body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmSummary {
    pub name: String,
    pub location: String,
    pub area_hectares: Decimal,
    pub crop_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmerSummary {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub id_number: Option<String>,
}

/// Present when issuance was triggered by an inspection
#[derive(Debug, Clone, Serialize)]
pub struct InspectionSummary {
    pub compliance_score: i32,
    pub inspector_name: Option<String>,
}

/// Everything a renderer needs to produce a certificate document
#[derive(Debug, Clone, Serialize)]
pub struct CertificateFacts {
    pub certificate: CertificateSummary,
    pub farm: FarmSummary,
    pub farmer: FarmerSummary,
    pub inspection: Option<InspectionSummary>,
}

/// Produces the certificate document
#[async_trait]
pub trait CertificateRenderer: Send + Sync {
    async fn render(&self, facts: &CertificateFacts) -> AppResult<Vec<u8>>;
}

/// Writes a single-page PDF 1.4 document using the built-in Helvetica font
#[derive(Debug, Clone, Default)]
pub struct PdfCertificateRenderer;

impl PdfCertificateRenderer {
    pub fn new() -> Self {
        Self
    }

    fn lines(facts: &CertificateFacts) -> Vec<(u32, String)> {
        let cert = &facts.certificate;
        let farm = &facts.farm;
        let farmer = &facts.farmer;

        let mut lines = vec![
            (22, "Organic Certification".to_string()),
            (12, cert.certifying_body.clone()),
            (10, String::new()),
            (12, format!("Certificate No.: {}", cert.number)),
            (12, format!("Issued: {}", cert.issue_date.format("%Y-%m-%d"))),
            (12, format!("Valid until: {}", cert.expiry_date.format("%Y-%m-%d"))),
            (12, format!("Scope: {}", cert.scope)),
            (10, String::new()),
            (14, "Farm".to_string()),
            (11, format!("Name: {}", farm.name)),
            (11, format!("Location: {}", farm.location)),
            (11, format!("Area: {} ha", farm.area_hectares)),
            (11, format!("Crops: {}", farm.crop_types.join(", "))),
            (10, String::new()),
            (14, "Farmer".to_string()),
            (11, format!("Name: {}", farmer.name)),
            (11, format!("Email: {}", farmer.email)),
        ];

        if let Some(phone) = &farmer.phone {
            lines.push((11, format!("Phone: {}", phone)));
        }
        if let Some(id_number) = &farmer.id_number {
            lines.push((11, format!("ID: {}", id_number)));
        }

        if let Some(inspection) = &facts.inspection {
            lines.push((10, String::new()));
            lines.push((14, "Inspection".to_string()));
            lines.push((
                11,
                format!("Compliance score: {}%", inspection.compliance_score),
            ));
            if let Some(inspector) = &inspection.inspector_name {
                lines.push((11, format!("Inspector: {}", inspector)));
            }
        }

        lines
    }

    fn content_stream(facts: &CertificateFacts) -> String {
        let mut stream = String::from("BT\n72 770 Td\n");
        for (size, text) in Self::lines(facts) {
            stream.push_str(&format!(
                "/F1 {} Tf\n({}) Tj\n0 -{} Td\n",
                size,
                escape_pdf_text(&text),
                size + 8
            ));
        }
        stream.push_str("ET\n");
        stream
    }

    fn write_document(content: &str) -> std::io::Result<Vec<u8>> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
             /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
                .to_string(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ),
        ];

        let mut out = Vec::new();
        out.write_all(b"%PDF-1.4\n")?;

        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body)?;
        }

        let xref_start = out.len();
        write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1)?;
        for offset in &offsets {
            write!(out, "{:010} 00000 n \n", offset)?;
        }
        write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )?;

        Ok(out)
    }
}

#[async_trait]
impl CertificateRenderer for PdfCertificateRenderer {
    async fn render(&self, facts: &CertificateFacts) -> AppResult<Vec<u8>> {
        let content = Self::content_stream(facts);
        Self::write_document(&content).map_err(|e| AppError::RenderingFailure(e.to_string()))
    }
}

/// Escape a string for a PDF literal. Helvetica only covers Latin-1, anything
/// outside printable ASCII becomes `?`.
fn escape_pdf_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            _ => escaped.push('?'),
        }
    }
    escaped
}
