//! Business logic services for the Organic Certification Platform

pub mod certificate;
pub mod identity;
pub mod inspection;
pub mod issuer;

pub use certificate::CertificateService;
pub use identity::CertificateIdentity;
pub use inspection::InspectionLifecycle;
pub use issuer::CertificateIssuer;
