//! Inspection checklist models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed set of compliance questions asked at every inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChecklistKey {
    SyntheticInputs,
    BufferZones,
    OrganicSeed,
    CompostManagement,
    RecordKeeping,
}

impl ChecklistKey {
    pub const ALL: [ChecklistKey; 5] = [
        ChecklistKey::SyntheticInputs,
        ChecklistKey::BufferZones,
        ChecklistKey::OrganicSeed,
        ChecklistKey::CompostManagement,
        ChecklistKey::RecordKeeping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChecklistKey::SyntheticInputs => "syntheticInputs",
            ChecklistKey::BufferZones => "bufferZones",
            ChecklistKey::OrganicSeed => "organicSeed",
            ChecklistKey::CompostManagement => "compostManagement",
            ChecklistKey::RecordKeeping => "recordKeeping",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "syntheticInputs" => Some(ChecklistKey::SyntheticInputs),
            "bufferZones" => Some(ChecklistKey::BufferZones),
            "organicSeed" => Some(ChecklistKey::OrganicSeed),
            "compostManagement" => Some(ChecklistKey::CompostManagement),
            "recordKeeping" => Some(ChecklistKey::RecordKeeping),
            _ => None,
        }
    }

    /// Question shown to the inspector. `true` is always the compliant answer.
    pub fn question(&self) -> &'static str {
        match self {
            ChecklistKey::SyntheticInputs => {
                "Is the farm free of synthetic fertilizers and pesticides?"
            }
            ChecklistKey::BufferZones => {
                "Are adequate buffer zones maintained against conventional neighbours?"
            }
            ChecklistKey::OrganicSeed => "Are organic seeds and planting stock used?",
            ChecklistKey::CompostManagement => "Is compost managed according to organic standards?",
            ChecklistKey::RecordKeeping => "Are production and input records complete and current?",
        }
    }
}

impl std::fmt::Display for ChecklistKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state answer. Serialized as `true`, `false` or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum ChecklistAnswer {
    Yes,
    No,
    #[default]
    Unanswered,
}

impl ChecklistAnswer {
    pub fn is_answered(&self) -> bool {
        !matches!(self, ChecklistAnswer::Unanswered)
    }
}

impl From<Option<bool>> for ChecklistAnswer {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ChecklistAnswer::Yes,
            Some(false) => ChecklistAnswer::No,
            None => ChecklistAnswer::Unanswered,
        }
    }
}

impl From<ChecklistAnswer> for Option<bool> {
    fn from(value: ChecklistAnswer) -> Self {
        match value {
            ChecklistAnswer::Yes => Some(true),
            ChecklistAnswer::No => Some(false),
            ChecklistAnswer::Unanswered => None,
        }
    }
}

/// One question/answer pair of a checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub key: ChecklistKey,
    pub question: String,
    pub answer: ChecklistAnswer,
}

impl ChecklistItem {
    pub fn new(key: ChecklistKey, answer: ChecklistAnswer) -> Self {
        Self {
            key,
            question: key.question().to_string(),
            answer,
        }
    }
}

/// Answers for the fixed question set, keyed by question.
///
/// Every key in [`ChecklistKey::ALL`] is always present; missing answers are
/// stored as [`ChecklistAnswer::Unanswered`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<ChecklistKey, ChecklistAnswer>",
    into = "BTreeMap<ChecklistKey, ChecklistAnswer>"
)]
pub struct Checklist {
    answers: BTreeMap<ChecklistKey, ChecklistAnswer>,
}

impl Default for Checklist {
    fn default() -> Self {
        Self {
            answers: ChecklistKey::ALL
                .iter()
                .map(|key| (*key, ChecklistAnswer::Unanswered))
                .collect(),
        }
    }
}

impl From<BTreeMap<ChecklistKey, ChecklistAnswer>> for Checklist {
    fn from(answers: BTreeMap<ChecklistKey, ChecklistAnswer>) -> Self {
        let mut checklist = Checklist::default();
        checklist.answers.extend(answers);
        checklist
    }
}

impl From<Checklist> for BTreeMap<ChecklistKey, ChecklistAnswer> {
    fn from(checklist: Checklist) -> Self {
        checklist.answers
    }
}

impl Checklist {
    pub fn answer(&self, key: ChecklistKey) -> ChecklistAnswer {
        self.answers.get(&key).copied().unwrap_or_default()
    }

    pub fn set(&mut self, key: ChecklistKey, answer: ChecklistAnswer) {
        self.answers.insert(key, answer);
    }

    /// Builder-style variant of [`Checklist::set`]
    pub fn with(mut self, key: ChecklistKey, answer: bool) -> Self {
        self.set(key, Some(answer).into());
        self
    }

    /// Merge a partial set of answers over the current ones
    pub fn merge(&mut self, answers: &BTreeMap<ChecklistKey, ChecklistAnswer>) {
        for (key, answer) in answers {
            self.set(*key, *answer);
        }
    }

    pub fn items(&self) -> Vec<ChecklistItem> {
        ChecklistKey::ALL
            .iter()
            .map(|key| ChecklistItem::new(*key, self.answer(*key)))
            .collect()
    }

    /// Keys that still have no yes/no answer
    pub fn unanswered(&self) -> Vec<ChecklistKey> {
        ChecklistKey::ALL
            .iter()
            .copied()
            .filter(|key| !self.answer(*key).is_answered())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unanswered().is_empty()
    }

    /// Compliance score over the currently answered items
    pub fn score(&self) -> i32 {
        crate::scoring::compute_compliance_score(&self.items())
    }
}
