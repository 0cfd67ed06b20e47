//! Shared types and rules for the Organic Certification Platform
//!
//! This crate contains the domain records, the checklist scorer and the
//! eligibility policy shared between the backend and the offline inspector
//! client (via WASM). Nothing in here performs I/O.

pub mod models;
pub mod scoring;
pub mod types;
pub mod validation;

pub use models::*;
pub use scoring::*;
pub use types::*;
pub use validation::*;
