// src/services/grading.rs

use std::fmt;

use serde::{Serialize, Serializer};

use crate::models::{
    attempt::{Attempt, UNANSWERED},
    quiz::{OPTIONS_PER_QUESTION, QuizQuestion},
};

/// Counts positions whose answer matches the correct option of the question
/// the position points at. Out-of-range indices never score.
pub fn score_answers(questions: &[QuizQuestion], order: &[i32], answers: &[i32]) -> i32 {
    order
        .iter()
        .zip(answers)
        .filter(|(idx, answer)| {
            usize::try_from(**idx)
                .ok()
                .and_then(|i| questions.get(i))
                .is_some_and(|q| q.correct_index == **answer)
        })
        .count() as i32
}

/// Checks an answers array: one entry per ordered position, each either
/// unanswered (-1) or an option index 0..=3.
pub fn validate_answers(answers: &[i32], expected_len: usize) -> Result<(), String> {
    if answers.len() != expected_len {
        return Err(format!(
            "answers must have {} entries, got {}",
            expected_len,
            answers.len()
        ));
    }
    let max_option = OPTIONS_PER_QUESTION as i32 - 1;
    if let Some(bad) = answers
        .iter()
        .find(|&&a| a != UNANSWERED && !(0..=max_option).contains(&a))
    {
        return Err(format!("answer {} is not a valid option", bad));
    }
    Ok(())
}

/// Rounded percentage of `score` over `total`. Zero questions give zero.
pub fn percentage(score: i32, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((score as f64 / total as f64) * 100.0).round() as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterGrade {
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LetterGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub fn grade(pct: i32) -> LetterGrade {
    match pct {
        p if p >= 85 => LetterGrade::APlus,
        p if p >= 75 => LetterGrade::A,
        p if p >= 65 => LetterGrade::B,
        p if p >= 50 => LetterGrade::C,
        p if p >= 40 => LetterGrade::D,
        _ => LetterGrade::F,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassStatus {
    Pass,
    Fail,
}

pub fn pass_fail(pct: i32, threshold: i32) -> PassStatus {
    if pct >= threshold {
        PassStatus::Pass
    } else {
        PassStatus::Fail
    }
}

/// Orders finalized attempts for display: score desc, earlier submission,
/// then id.
pub fn sort_for_ranking(attempts: &mut [Attempt]) {
    attempts.sort_by(|a, b| {
        b.score
            .unwrap_or(0)
            .cmp(&a.score.unwrap_or(0))
            .then_with(|| a.submitted_at.cmp(&b.submitted_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Competition ranking: 1 + number of siblings with a strictly higher score.
/// Tied scores share a rank and the following rank is skipped.
pub fn competition_rank(target: &Attempt, siblings: &[Attempt]) -> usize {
    let score = target.score.unwrap_or(0);
    1 + siblings
        .iter()
        .filter(|s| s.id != target.id && s.is_finalized() && s.score.unwrap_or(0) > score)
        .count()
}

/// Human-facing metrics for one finalized attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSummary {
    pub score: i32,
    pub total: usize,
    pub percentage: i32,
    pub grade: LetterGrade,
    pub status: PassStatus,
}

pub fn summarize(attempt: &Attempt, pass_threshold: i32) -> ResultSummary {
    let score = attempt.score.unwrap_or(0);
    let total = attempt.total_questions();
    let pct = percentage(score, total);
    ResultSummary {
        score,
        total,
        percentage: pct,
        grade: grade(pct),
        status: pass_fail(pct, pass_threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn question(correct: i32) -> QuizQuestion {
        QuizQuestion {
            text: "Q".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: correct,
            difficulty: None,
        }
    }

    fn finalized(id: i64, score: i32, offset_secs: i64) -> Attempt {
        let now = Utc::now();
        Attempt {
            id,
            quiz_id: 1,
            student_id: id,
            student_name: format!("Student {}", id),
            student_gr_number: format!("GR{}", id),
            student_roll_number: id.to_string(),
            class_name: "7B".to_string(),
            question_order: (0..10).collect(),
            answers: vec![0; 10],
            score: Some(score),
            started_at: now,
            submitted_at: Some(now + Duration::seconds(offset_secs)),
            late: false,
            version: 1,
        }
    }

    #[test]
    fn test_score_counts_matches_in_order() {
        let questions = vec![question(0), question(2), question(1)];
        assert_eq!(score_answers(&questions, &[0, 1, 2], &[0, 2, 0]), 2);
    }

    #[test]
    fn test_score_follows_question_order() {
        let questions = vec![question(0), question(2), question(1)];
        // Position 0 shows question 2, position 1 question 0.
        assert_eq!(score_answers(&questions, &[2, 0], &[1, 0]), 2);
    }

    #[test]
    fn test_score_ignores_unanswered_and_bad_indices() {
        let questions = vec![question(0), question(1)];
        assert_eq!(score_answers(&questions, &[0, 7, -3], &[-1, 1, 1]), 0);
    }

    #[test]
    fn test_validate_answers() {
        assert!(validate_answers(&[0, -1, 3], 3).is_ok());
        assert!(validate_answers(&[0, -1], 3).is_err());
        assert!(validate_answers(&[0, 4, 1], 3).is_err());
        assert!(validate_answers(&[-2], 1).is_err());
    }

    #[test]
    fn test_percentage_rounds() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 5), 100);
    }

    #[test]
    fn test_grade_boundaries() {
        let pcts = [85, 84, 75, 74, 65, 64, 50, 49, 40, 39];
        let expected = ["A+", "A", "A", "B", "B", "C", "C", "D", "D", "F"];
        for (pct, want) in pcts.iter().zip(expected) {
            assert_eq!(grade(*pct).as_str(), want, "pct {}", pct);
        }
    }

    #[test]
    fn test_pass_threshold() {
        assert_eq!(pass_fail(40, 40), PassStatus::Pass);
        assert_eq!(pass_fail(39, 40), PassStatus::Fail);
        assert_eq!(pass_fail(59, 60), PassStatus::Fail);
    }

    #[test]
    fn test_competition_rank_shares_ties() {
        let attempts = vec![finalized(1, 9, 0), finalized(2, 7, 1), finalized(3, 9, 2)];
        assert_eq!(competition_rank(&attempts[0], &attempts), 1);
        assert_eq!(competition_rank(&attempts[2], &attempts), 1);
        assert_eq!(competition_rank(&attempts[1], &attempts), 3);
    }

    #[test]
    fn test_sort_prefers_earlier_submission_on_tie() {
        let mut attempts = vec![finalized(1, 7, 0), finalized(2, 9, 30), finalized(3, 9, 10)];
        sort_for_ranking(&mut attempts);
        let ids: Vec<i64> = attempts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_summarize() {
        let attempt = finalized(1, 7, 0);
        let summary = summarize(&attempt, 40);
        assert_eq!(summary.percentage, 70);
        assert_eq!(summary.grade, LetterGrade::B);
        assert_eq!(summary.status, PassStatus::Pass);
        assert_eq!(summarize(&attempt, 75).status, PassStatus::Fail);
    }
}
