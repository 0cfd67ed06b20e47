//! Domain models for the Organic Certification Platform

mod certificate;
mod checklist;
mod farm;
mod inspection;

pub use certificate::*;
pub use checklist::*;
pub use farm::*;
pub use inspection::*;
