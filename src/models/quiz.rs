// src/models/quiz.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::student::Student;

/// Number of options every question carries.
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Who a quiz is served to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizTarget {
    All,
    Class,
    Student,
}

impl fmt::Display for QuizTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuizTarget::All => "all",
            QuizTarget::Class => "class",
            QuizTarget::Student => "student",
        };
        f.write_str(s)
    }
}

impl FromStr for QuizTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(QuizTarget::All),
            "class" => Ok(QuizTarget::Class),
            "student" => Ok(QuizTarget::Student),
            other => Err(format!("unknown quiz target '{}'", other)),
        }
    }
}

/// One multiple-choice question as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: i32,
    /// Unset difficulty is treated as easy.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl QuizQuestion {
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty.unwrap_or_default()
    }
}

/// A quiz definition as stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub subject: String,
    /// Shared secret a student must present to start the quiz.
    pub exam_key: Option<String>,
    pub duration_minutes: i32,
    /// How many questions of the bank are served per attempt.
    pub question_limit: i32,
    pub target: QuizTarget,
    pub class_name: Option<String>,
    pub student_id: Option<i64>,
    pub results_announced: bool,
    pub pass_percentage: i32,
    pub questions: Vec<QuizQuestion>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Quiz {
    /// Number of questions served per attempt.
    pub fn served_count(&self) -> usize {
        let total = self.questions.len();
        match usize::try_from(self.question_limit) {
            Ok(limit) if limit > 0 => limit.min(total),
            _ => total,
        }
    }

    pub fn requires_exam_key(&self) -> bool {
        self.exam_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Checks a presented exam key against the quiz's secret.
    pub fn accepts_key(&self, presented: Option<&str>) -> bool {
        match self.exam_key.as_deref() {
            Some(key) if !key.is_empty() => presented == Some(key),
            _ => true,
        }
    }

    /// Whether the quiz is served to the given student.
    pub fn is_visible_to(&self, student: &Student) -> bool {
        match self.target {
            QuizTarget::All => true,
            QuizTarget::Class => self.class_name.as_deref() == Some(student.class_name.as_str()),
            QuizTarget::Student => self.student_id == Some(student.id),
        }
    }
}

/// Question DTO for students (no correct answer).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    /// Index into the quiz's original question list.
    pub index: i32,
    pub text: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
}

/// Quiz DTO for students. Questions are only handed out by session init.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: i64,
    pub title: String,
    pub subject: String,
    pub duration_minutes: i32,
    pub question_count: usize,
    pub requires_exam_key: bool,
    pub results_announced: bool,
    pub pass_percentage: i32,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            subject: quiz.subject.clone(),
            duration_minutes: quiz.duration_minutes,
            question_count: quiz.served_count(),
            requires_exam_key: quiz.requires_exam_key(),
            results_announced: quiz.results_announced,
            pass_percentage: quiz.pass_percentage,
        }
    }
}

/// Builds the student-facing questions for an attempt's order.
pub fn public_questions(quiz: &Quiz, order: &[i32]) -> Vec<PublicQuestion> {
    order
        .iter()
        .filter_map(|&idx| {
            let q = quiz.questions.get(usize::try_from(idx).ok()?)?;
            Some(PublicQuestion {
                index: idx,
                text: q.text.clone(),
                options: q.options.clone(),
                difficulty: q.difficulty(),
            })
        })
        .collect()
}

/// DTO for creating or replacing a quiz.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_quiz_shape))]
pub struct UpsertQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(max = 100))]
    pub exam_key: Option<String>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: i32,
    /// Defaults to the full question bank.
    pub question_limit: Option<i32>,
    pub target: QuizTarget,
    pub class_name: Option<String>,
    pub student_id: Option<i64>,
    #[serde(default)]
    pub results_announced: bool,
    #[validate(range(min = 0, max = 100))]
    pub pass_percentage: Option<i32>,
    #[validate(length(min = 1, max = 500))]
    pub questions: Vec<QuizQuestion>,
}

fn validate_quiz_shape(req: &UpsertQuizRequest) -> Result<(), validator::ValidationError> {
    for q in &req.questions {
        if q.text.trim().is_empty() {
            return Err(validator::ValidationError::new("question_text_empty"));
        }
        if q.options.len() != OPTIONS_PER_QUESTION {
            return Err(validator::ValidationError::new("question_needs_four_options"));
        }
        if !(0..OPTIONS_PER_QUESTION as i32).contains(&q.correct_index) {
            return Err(validator::ValidationError::new("correct_index_out_of_range"));
        }
    }

    if let Some(limit) = req.question_limit {
        if limit < 1 || limit as usize > req.questions.len() {
            return Err(validator::ValidationError::new("question_limit_out_of_range"));
        }
    }

    match req.target {
        QuizTarget::All => {}
        QuizTarget::Class => {
            if req.class_name.as_deref().is_none_or(|c| c.trim().is_empty()) {
                return Err(validator::ValidationError::new("class_target_needs_class_name"));
            }
        }
        QuizTarget::Student => {
            if req.student_id.is_none() {
                return Err(validator::ValidationError::new("student_target_needs_student_id"));
            }
        }
    }

    Ok(())
}

/// Validated quiz fields handed to the store.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub subject: String,
    pub exam_key: Option<String>,
    pub duration_minutes: i32,
    pub question_limit: i32,
    pub target: QuizTarget,
    pub class_name: Option<String>,
    pub student_id: Option<i64>,
    pub results_announced: bool,
    pub pass_percentage: i32,
    pub questions: Vec<QuizQuestion>,
}

/// Payload for toggling the results-announced gate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceRequest {
    pub results_announced: bool,
}

/// Query parameters for listing quizzes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizListParams {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub class_name: Option<String>,
}

/// Audience filter for the store. Empty means every quiz.
#[derive(Debug, Clone, Default)]
pub struct QuizFilter {
    pub id: Option<i64>,
    pub student_id: Option<i64>,
    pub class_name: Option<String>,
}

impl QuizFilter {
    pub fn matches(&self, quiz: &Quiz) -> bool {
        if let Some(id) = self.id {
            if quiz.id != id {
                return false;
            }
        }
        if self.student_id.is_none() && self.class_name.is_none() {
            return true;
        }
        match quiz.target {
            QuizTarget::All => true,
            QuizTarget::Class => {
                self.class_name.is_some() && quiz.class_name == self.class_name
            }
            QuizTarget::Student => {
                self.student_id.is_some() && quiz.student_id == self.student_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: i32) -> QuizQuestion {
        QuizQuestion {
            text: "Q".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: correct,
            difficulty: None,
        }
    }

    fn request(questions: Vec<QuizQuestion>) -> UpsertQuizRequest {
        UpsertQuizRequest {
            title: "Algebra".to_string(),
            subject: "Math".to_string(),
            exam_key: None,
            duration_minutes: 10,
            question_limit: None,
            target: QuizTarget::All,
            class_name: None,
            student_id: None,
            results_announced: false,
            pass_percentage: None,
            questions,
        }
    }

    #[test]
    fn test_valid_quiz_passes() {
        assert!(request(vec![question(0), question(3)]).validate().is_ok());
    }

    #[test]
    fn test_correct_index_out_of_range_rejected() {
        assert!(request(vec![question(4)]).validate().is_err());
    }

    #[test]
    fn test_three_options_rejected() {
        let mut q = question(1);
        q.options.pop();
        assert!(request(vec![q]).validate().is_err());
    }

    #[test]
    fn test_limit_above_bank_rejected() {
        let mut req = request(vec![question(0)]);
        req.question_limit = Some(2);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_class_target_needs_class_name() {
        let mut req = request(vec![question(0)]);
        req.target = QuizTarget::Class;
        assert!(req.validate().is_err());
        req.class_name = Some("7B".to_string());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_unset_difficulty_is_easy() {
        let q: QuizQuestion = serde_json::from_value(serde_json::json!({
            "text": "2+2?",
            "options": ["1", "2", "3", "4"],
            "correctIndex": 3
        }))
        .unwrap();
        assert_eq!(q.difficulty(), Difficulty::Easy);
    }

    #[test]
    fn test_target_round_trips_through_str() {
        for t in [QuizTarget::All, QuizTarget::Class, QuizTarget::Student] {
            assert_eq!(t.to_string().parse::<QuizTarget>().unwrap(), t);
        }
        assert!("school".parse::<QuizTarget>().is_err());
    }
}
