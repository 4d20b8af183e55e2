//! The canonical qualifying question sequence. Only four of these are parser-backed (see
//! `crate::domain::parse::PARSEABLE_FIELDS`); the rest are stored verbatim as free text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    pub step: i32,
    pub key: &'static str,
    pub prompt: &'static str,
}

pub const QUESTIONS: &[Question] = &[
    Question { step: 0, key: "idea", prompt: "question.idea" },
    Question { step: 1, key: "placement", prompt: "question.placement" },
    Question { step: 2, key: "dimensions", prompt: "question.dimensions" },
    Question { step: 3, key: "style", prompt: "question.style" },
    Question { step: 4, key: "complexity", prompt: "question.complexity" },
    Question { step: 5, key: "coverup", prompt: "question.coverup" },
    Question { step: 6, key: "reference_images", prompt: "question.reference_images" },
    Question { step: 7, key: "instagram_handle", prompt: "question.instagram_handle" },
    Question { step: 8, key: "budget", prompt: "question.budget" },
    Question { step: 9, key: "location_city", prompt: "question.location_city" },
    Question { step: 10, key: "preferred_time_windows", prompt: "question.preferred_time_windows" },
    Question { step: 11, key: "contact_name", prompt: "question.contact_name" },
    Question { step: 12, key: "contact_email", prompt: "question.contact_email" },
];

pub fn at_step(step: i32) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.step == step)
}

pub fn is_last_step(step: i32) -> bool {
    step == QUESTIONS.len() as i32 - 1
}

pub fn total_steps() -> i32 {
    QUESTIONS.len() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_contiguous() {
        for (idx, q) in QUESTIONS.iter().enumerate() {
            assert_eq!(q.step, idx as i32);
        }
    }

    #[test]
    fn last_step_detection() {
        assert!(is_last_step(total_steps() - 1));
        assert!(!is_last_step(0));
    }
}
