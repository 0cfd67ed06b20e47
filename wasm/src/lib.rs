//! WebAssembly module for the Organic Certification Platform
//!
//! Lets the inspector's offline client compute the same checklist score and
//! eligibility verdict the backend will, before the inspection is synced.

use std::collections::BTreeMap;
use wasm_bindgen::prelude::*;

pub use shared::models::*;
pub use shared::scoring::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("organic certification scoring loaded"));
}

fn parse_checklist(answers_json: &str) -> Result<Checklist, String> {
    let raw: BTreeMap<String, Option<bool>> = serde_json::from_str(answers_json)
        .map_err(|e| format!("Invalid checklist JSON: {}", e))?;
    let answers = parse_checklist_answers(&raw).map_err(|e| e.to_string())?;
    Ok(Checklist::from(answers))
}

/// Compliance score (0-100) of `{"<key>": true | false | null}` answers
#[wasm_bindgen]
pub fn compute_checklist_score(answers_json: &str) -> Result<i32, JsValue> {
    let checklist = parse_checklist(answers_json).map_err(|e| JsValue::from_str(&e))?;
    Ok(checklist.score())
}

/// Whether a compliance score qualifies for certification
#[wasm_bindgen]
pub fn is_certification_eligible(score: i32) -> bool {
    is_eligible(score)
}

/// Minimum qualifying compliance score
#[wasm_bindgen]
pub fn eligibility_threshold() -> i32 {
    ELIGIBILITY_THRESHOLD
}

/// Keys still unanswered, as a JSON array
#[wasm_bindgen]
pub fn checklist_unanswered(answers_json: &str) -> Result<String, JsValue> {
    let checklist = parse_checklist(answers_json).map_err(|e| JsValue::from_str(&e))?;
    serde_json::to_string(&checklist.unanswered()).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Whether every key carries a yes/no answer, so the inspection can be completed
#[wasm_bindgen]
pub fn is_checklist_complete(answers_json: &str) -> Result<bool, JsValue> {
    let checklist = parse_checklist(answers_json).map_err(|e| JsValue::from_str(&e))?;
    Ok(validate_checklist_complete(&checklist).is_ok())
}

/// The fixed checklist questions, as a JSON array of `{key, question}`
#[wasm_bindgen]
pub fn checklist_questions() -> String {
    let questions: Vec<serde_json::Value> = ChecklistKey::ALL
        .iter()
        .map(|key| serde_json::json!({ "key": key.as_str(), "question": key.question() }))
        .collect();
    serde_json::Value::Array(questions).to_string()
}
