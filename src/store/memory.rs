// src/store/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt, ResultFilter, ResultRecord, SaveOutcome},
        quiz::{NewQuiz, Quiz, QuizFilter},
        student::{NewStudent, Student},
        user::{NewUser, ROLE_STUDENT, User},
    },
    services::grading::sort_for_ranking,
    store::QuizStore,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    students: BTreeMap<i64, Student>,
    quizzes: BTreeMap<i64, Quiz>,
    attempts: BTreeMap<i64, Attempt>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username_taken(&self, username: &str) -> bool {
        self.users.values().any(|u| u.username == username)
    }
}

/// Keeps everything in process memory behind one lock, so every operation,
/// including the conditional create, is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn build_quiz(id: i64, quiz: NewQuiz, created_at: DateTime<Utc>) -> Quiz {
    Quiz {
        id,
        title: quiz.title,
        subject: quiz.subject,
        exam_key: quiz.exam_key,
        duration_minutes: quiz.duration_minutes,
        question_limit: quiz.question_limit,
        target: quiz.target,
        class_name: quiz.class_name,
        student_id: quiz.student_id,
        results_announced: quiz.results_announced,
        pass_percentage: quiz.pass_percentage,
        questions: quiz.questions,
        created_at,
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.username_taken(&user.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        let id = tables.next_id();
        let user = User {
            id,
            username: user.username,
            password: user.password,
            role: user.role,
            student_id: user.student_id,
            created_at: Some(Utc::now()),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn create_student(
        &self,
        student: NewStudent,
        password_hash: String,
    ) -> Result<Student, AppError> {
        let mut tables = self.tables.lock().await;
        let gr_taken = tables
            .students
            .values()
            .any(|s| s.gr_number == student.gr_number);
        if gr_taken || tables.username_taken(&student.gr_number) {
            return Err(AppError::Conflict(format!(
                "GR number '{}' already exists",
                student.gr_number
            )));
        }

        let now = Utc::now();
        let student_id = tables.next_id();
        let record = Student {
            id: student_id,
            name: student.name,
            gr_number: student.gr_number,
            roll_number: student.roll_number,
            class_name: student.class_name,
            created_at: Some(now),
        };
        tables.students.insert(student_id, record.clone());

        let user_id = tables.next_id();
        tables.users.insert(
            user_id,
            User {
                id: user_id,
                username: record.gr_number.clone(),
                password: password_hash,
                role: ROLE_STUDENT.to_string(),
                student_id: Some(student_id),
                created_at: Some(now),
            },
        );

        Ok(record)
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, AppError> {
        Ok(self.tables.lock().await.students.get(&id).cloned())
    }

    async fn list_students(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError> {
        let tables = self.tables.lock().await;
        let mut students: Vec<Student> = tables
            .students
            .values()
            .filter(|s| class_name.is_none_or(|c| s.class_name == c))
            .cloned()
            .collect();
        students.sort_by(|a, b| {
            a.class_name
                .cmp(&b.class_name)
                .then_with(|| a.roll_number.cmp(&b.roll_number))
        });
        Ok(students)
    }

    async fn delete_student(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.students.remove(&id).is_none() {
            return Ok(false);
        }
        tables.users.retain(|_, u| u.student_id != Some(id));
        Ok(true)
    }

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        let quiz = build_quiz(id, quiz, Utc::now());
        tables.quizzes.insert(id, quiz.clone());
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, quiz: NewQuiz) -> Result<Option<Quiz>, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(existing) = tables.quizzes.get_mut(&id) else {
            return Ok(None);
        };
        *existing = build_quiz(id, quiz, existing.created_at);
        Ok(Some(existing.clone()))
    }

    async fn set_results_announced(&self, id: i64, announced: bool) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.quizzes.get_mut(&id) {
            Some(quiz) => {
                quiz.results_announced = announced;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.tables.lock().await.quizzes.remove(&id).is_some())
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.lock().await.quizzes.get(&id).cloned())
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .quizzes
            .values()
            .rev()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }

    async fn create_attempt_if_absent(
        &self,
        attempt: NewAttempt,
    ) -> Result<(Attempt, bool), AppError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .attempts
            .values()
            .find(|a| a.quiz_id == attempt.quiz_id && a.student_id == attempt.student_id)
        {
            return Ok((existing.clone(), false));
        }

        let id = tables.next_id();
        let answers = attempt.blank_answers();
        let created = Attempt {
            id,
            quiz_id: attempt.quiz_id,
            student_id: attempt.student_id,
            student_name: attempt.student_name,
            student_gr_number: attempt.student_gr_number,
            student_roll_number: attempt.student_roll_number,
            class_name: attempt.class_name,
            question_order: attempt.question_order,
            answers,
            score: None,
            started_at: attempt.started_at,
            submitted_at: None,
            late: false,
            version: 1,
        };
        tables.attempts.insert(id, created.clone());
        Ok((created, true))
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.tables.lock().await.attempts.get(&id).cloned())
    }

    async fn find_attempt(
        &self,
        quiz_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attempts
            .values()
            .find(|a| a.quiz_id == quiz_id && a.student_id == student_id)
            .cloned())
    }

    async fn save_answers(
        &self,
        id: i64,
        answers: &[i32],
        expected_version: Option<i64>,
    ) -> Result<SaveOutcome, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(attempt) = tables.attempts.get_mut(&id) else {
            return Ok(SaveOutcome::Missing);
        };
        if attempt.is_finalized() {
            return Ok(SaveOutcome::Finalized);
        }
        if let Some(expected) = expected_version {
            if expected != attempt.version {
                return Ok(SaveOutcome::VersionMismatch {
                    current: attempt.version,
                });
            }
        }
        attempt.answers = answers.to_vec();
        attempt.version += 1;
        Ok(SaveOutcome::Saved {
            version: attempt.version,
        })
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        answers: &[i32],
        score: i32,
        submitted_at: DateTime<Utc>,
        late: bool,
    ) -> Result<Option<Attempt>, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.attempts.get_mut(&id) {
            Some(attempt) if !attempt.is_finalized() => {
                attempt.answers = answers.to_vec();
                attempt.score = Some(score);
                attempt.submitted_at = Some(submitted_at);
                attempt.late = late;
                attempt.version += 1;
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError> {
        let tables = self.tables.lock().await;
        let mut attempts: Vec<&Attempt> = tables
            .attempts
            .values()
            .filter(|a| filter.matches(a))
            .collect();
        attempts.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));

        let limit = usize::try_from(filter.limit).unwrap_or(0);
        Ok(attempts
            .into_iter()
            .take(limit)
            .map(|a| {
                let quiz = tables.quizzes.get(&a.quiz_id);
                ResultRecord {
                    attempt: a.clone(),
                    quiz_title: quiz.map(|q| q.title.clone()),
                    quiz_subject: quiz.map(|q| q.subject.clone()),
                    results_announced: quiz.map(|q| q.results_announced),
                    pass_percentage: quiz.map(|q| q.pass_percentage),
                }
            })
            .collect())
    }

    async fn class_results(
        &self,
        quiz_id: i64,
        class_name: &str,
    ) -> Result<Vec<Attempt>, AppError> {
        let tables = self.tables.lock().await;
        let mut attempts: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id && a.class_name == class_name && a.is_finalized())
            .cloned()
            .collect();
        sort_for_ranking(&mut attempts);
        Ok(attempts)
    }

    async fn delete_results(
        &self,
        quiz_id: i64,
        class_name: Option<&str>,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let before = tables.attempts.len();
        tables.attempts.retain(|_, a| {
            !(a.quiz_id == quiz_id && class_name.is_none_or(|c| a.class_name == c))
        });
        Ok((before - tables.attempts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizTarget;

    fn new_attempt(quiz_id: i64, student_id: i64) -> NewAttempt {
        NewAttempt {
            quiz_id,
            student_id,
            student_name: "Ayesha".to_string(),
            student_gr_number: "GR-1".to_string(),
            student_roll_number: "12".to_string(),
            class_name: "7B".to_string(),
            question_order: vec![2, 0, 1],
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_attempt_if_absent_is_keyed_by_pair() {
        let store = MemoryStore::new();
        let (first, created) = store.create_attempt_if_absent(new_attempt(1, 5)).await.unwrap();
        assert!(created);
        assert_eq!(first.answers, vec![-1, -1, -1]);

        let mut again = new_attempt(1, 5);
        again.question_order = vec![0, 1, 2];
        let (second, created) = store.create_attempt_if_absent(again).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.question_order, vec![2, 0, 1]);

        let (other, created) = store.create_attempt_if_absent(new_attempt(2, 5)).await.unwrap();
        assert!(created);
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_save_answers_checks_version_and_state() {
        let store = MemoryStore::new();
        let (attempt, _) = store.create_attempt_if_absent(new_attempt(1, 5)).await.unwrap();

        let saved = store.save_answers(attempt.id, &[1, -1, 2], Some(1)).await.unwrap();
        assert_eq!(saved, SaveOutcome::Saved { version: 2 });

        let stale = store.save_answers(attempt.id, &[0, 0, 0], Some(1)).await.unwrap();
        assert_eq!(stale, SaveOutcome::VersionMismatch { current: 2 });

        let blind = store.save_answers(attempt.id, &[3, 3, 3], None).await.unwrap();
        assert_eq!(blind, SaveOutcome::Saved { version: 3 });

        store
            .finalize_attempt(attempt.id, &[3, 3, 3], 1, Utc::now(), false)
            .await
            .unwrap()
            .unwrap();
        let after = store.save_answers(attempt.id, &[0, 0, 0], None).await.unwrap();
        assert_eq!(after, SaveOutcome::Finalized);

        assert_eq!(
            store.save_answers(999, &[0], None).await.unwrap(),
            SaveOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_finalize_happens_once() {
        let store = MemoryStore::new();
        let (attempt, _) = store.create_attempt_if_absent(new_attempt(1, 5)).await.unwrap();
        let done = store
            .finalize_attempt(attempt.id, &[0, 0, 0], 2, Utc::now(), false)
            .await
            .unwrap();
        assert_eq!(done.unwrap().score, Some(2));

        let again = store
            .finalize_attempt(attempt.id, &[1, 1, 1], 0, Utc::now(), true)
            .await
            .unwrap();
        assert!(again.is_none());
        let stored = store.get_attempt(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.score, Some(2));
        assert!(!stored.late);
    }

    #[tokio::test]
    async fn test_list_results_tolerates_deleted_quiz() {
        let store = MemoryStore::new();
        let quiz = store
            .create_quiz(NewQuiz {
                title: "Fractions".into(),
                subject: "Math".into(),
                exam_key: None,
                duration_minutes: 5,
                question_limit: 3,
                target: QuizTarget::All,
                class_name: None,
                student_id: None,
                results_announced: true,
                pass_percentage: 40,
                questions: Vec::new(),
            })
            .await
            .unwrap();
        let (attempt, _) = store
            .create_attempt_if_absent(new_attempt(quiz.id, 5))
            .await
            .unwrap();
        store
            .finalize_attempt(attempt.id, &[0, 0, 0], 1, Utc::now(), false)
            .await
            .unwrap();
        store.delete_quiz(quiz.id).await.unwrap();

        let filter = ResultFilter {
            limit: 10,
            ..Default::default()
        };
        let rows = store.list_results(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].quiz_title.is_none());
        assert!(rows[0].results_announced.is_none());
    }

    #[tokio::test]
    async fn test_student_gr_number_is_unique() {
        let store = MemoryStore::new();
        let student = NewStudent {
            name: "Bilal".into(),
            gr_number: "GR-9".into(),
            roll_number: "3".into(),
            class_name: "8A".into(),
        };
        store.create_student(student.clone(), "hash".into()).await.unwrap();
        let dup = store.create_student(student, "hash".into()).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        let user = store.find_user_by_username("GR-9").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_STUDENT);
    }
}
