//! Compliance scoring and certification eligibility
//!
//! Both functions are pure so the offline client can show the same score and
//! eligibility verdict the backend will compute.

use crate::models::{ChecklistAnswer, ChecklistItem};

/// Minimum compliance score required to qualify for certification
pub const ELIGIBILITY_THRESHOLD: i32 = 80;

/// Compute the compliance score (0-100) of a checklist.
///
/// Only items answered yes or no count; unanswered items are left out of the
/// denominator. A checklist with no answered items scores 0. The percentage is
/// rounded half-up.
pub fn compute_compliance_score(items: &[ChecklistItem]) -> i32 {
    let (compliant, answered) = items.iter().fold((0i64, 0i64), |(yes, total), item| {
        match item.answer {
            ChecklistAnswer::Yes => (yes + 1, total + 1),
            ChecklistAnswer::No => (yes, total + 1),
            ChecklistAnswer::Unanswered => (yes, total),
        }
    });

    if answered == 0 {
        return 0;
    }

    // round(100 * c / a) == floor((200 * c + a) / (2 * a)) for non-negative values
    ((200 * compliant + answered) / (2 * answered)) as i32
}

/// Whether a compliance score qualifies for certification
pub fn is_eligible(score: i32) -> bool {
    score >= ELIGIBILITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Checklist, ChecklistKey};

    fn items(answers: &[Option<bool>]) -> Vec<ChecklistItem> {
        answers
            .iter()
            .zip(ChecklistKey::ALL.iter().cycle())
            .map(|(answer, key)| ChecklistItem::new(*key, (*answer).into()))
            .collect()
    }

    #[test]
    fn test_empty_checklist_scores_zero() {
        assert_eq!(compute_compliance_score(&[]), 0);
    }

    #[test]
    fn test_all_unanswered_scores_zero() {
        assert_eq!(compute_compliance_score(&items(&[None; 5])), 0);
    }

    #[test]
    fn test_four_of_five_scores_eighty() {
        let checklist = Checklist::default()
            .with(ChecklistKey::SyntheticInputs, false)
            .with(ChecklistKey::BufferZones, true)
            .with(ChecklistKey::OrganicSeed, true)
            .with(ChecklistKey::CompostManagement, true)
            .with(ChecklistKey::RecordKeeping, true);

        assert_eq!(checklist.score(), 80);
    }

    #[test]
    fn test_unanswered_items_excluded_from_denominator() {
        let score = compute_compliance_score(&items(&[Some(true), Some(true), None, None, None]));
        assert_eq!(score, 100);

        let score = compute_compliance_score(&items(&[Some(true), Some(false), None]));
        assert_eq!(score, 50);
    }

    #[test]
    fn test_rounds_half_up() {
        // 1/8 = 12.5%
        let mut answers = vec![Some(false); 7];
        answers.push(Some(true));
        assert_eq!(compute_compliance_score(&items(&answers)), 13);

        // 2/3 = 66.67%
        assert_eq!(
            compute_compliance_score(&items(&[Some(true), Some(true), Some(false)])),
            67
        );

        // 1/3 = 33.33%
        assert_eq!(
            compute_compliance_score(&items(&[Some(true), Some(false), Some(false)])),
            33
        );
    }

    #[test]
    fn test_three_of_five_scores_sixty() {
        let score = compute_compliance_score(&items(&[
            Some(true),
            Some(true),
            Some(true),
            Some(false),
            Some(false),
        ]));
        assert_eq!(score, 60);
    }

    #[test]
    fn test_eligibility_boundary() {
        assert!(!is_eligible(79));
        assert!(is_eligible(80));
        assert!(is_eligible(100));
        assert!(!is_eligible(0));
    }
}
