//! HTTP handlers

pub mod certificate;
pub mod health;
pub mod inspection;

pub use certificate::*;
pub use health::*;
pub use inspection::*;
