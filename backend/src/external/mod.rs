//! External collaborators: document rendering and document storage

pub mod renderer;
pub mod storage;

pub use renderer::{
    CertificateFacts, CertificateRenderer, CertificateSummary, FarmSummary, FarmerSummary,
    InspectionSummary, PdfCertificateRenderer,
};
pub use storage::{
    document_store_from_config, DocumentStore, HttpDocumentStore, LocalDocumentStore,
    MemoryDocumentStore,
};
