//! Farm, farmer and inspector records
//!
//! These are owned by the registration side of the platform; certification
//! only reads them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farm {
    pub id: i64,
    pub farmer_id: i64,
    pub name: String,
    pub location: String,
    pub area_hectares: Decimal,
    pub crop_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farmer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub id_number: Option<String>,
}

/// A user who conducts inspections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspector {
    pub id: i64,
    pub name: String,
    pub email: String,
}
