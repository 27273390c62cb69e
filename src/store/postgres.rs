// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt, ResultFilter, ResultRecord, SaveOutcome},
        quiz::{NewQuiz, Quiz, QuizFilter, QuizQuestion},
        student::{NewStudent, Student},
        user::{NewUser, ROLE_STUDENT, User},
    },
    store::QuizStore,
};

const QUIZ_COLUMNS: &str = "id, title, subject, exam_key, duration_minutes, question_limit, \
     target, class_name, student_id, results_announced, pass_percentage, questions, created_at";

const ATTEMPT_COLUMNS: &str = "id, quiz_id, student_id, student_name, student_gr_number, \
     student_roll_number, class_name, question_order, answers, score, started_at, \
     submitted_at, late, version";

/// Postgres-backed store. Uniqueness of (quiz, student) and the single
/// finalize transition are enforced by the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    title: String,
    subject: String,
    exam_key: Option<String>,
    duration_minutes: i32,
    question_limit: i32,
    target: String,
    class_name: Option<String>,
    student_id: Option<i64>,
    results_announced: bool,
    pass_percentage: i32,
    questions: Json<Vec<QuizQuestion>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = AppError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        let target = row.target.parse().map_err(AppError::InternalServerError)?;
        Ok(Quiz {
            id: row.id,
            title: row.title,
            subject: row.subject,
            exam_key: row.exam_key,
            duration_minutes: row.duration_minutes,
            question_limit: row.question_limit,
            target,
            class_name: row.class_name,
            student_id: row.student_id,
            results_announced: row.results_announced,
            pass_percentage: row.pass_percentage,
            questions: row.questions.0,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    quiz_id: i64,
    student_id: i64,
    student_name: String,
    student_gr_number: String,
    student_roll_number: String,
    class_name: String,
    question_order: Json<Vec<i32>>,
    answers: Json<Vec<i32>>,
    score: Option<i32>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    late: bool,
    version: i64,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Attempt {
            id: row.id,
            quiz_id: row.quiz_id,
            student_id: row.student_id,
            student_name: row.student_name,
            student_gr_number: row.student_gr_number,
            student_roll_number: row.student_roll_number,
            class_name: row.class_name,
            question_order: row.question_order.0,
            answers: row.answers.0,
            score: row.score,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            late: row.late,
            version: row.version,
        }
    }
}

/// Attempt joined with the (possibly deleted) quiz.
#[derive(FromRow)]
struct ResultRow {
    #[sqlx(flatten)]
    attempt: AttemptRow,
    quiz_title: Option<String>,
    quiz_subject: Option<String>,
    results_announced: Option<bool>,
    pass_percentage: Option<i32>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn bind_quiz_fields<'a>(builder: &mut QueryBuilder<'a, Postgres>, quiz: NewQuiz) {
    let mut separated = builder.separated(", ");
    separated.push_bind(quiz.title);
    separated.push_bind(quiz.subject);
    separated.push_bind(quiz.exam_key);
    separated.push_bind(quiz.duration_minutes);
    separated.push_bind(quiz.question_limit);
    separated.push_bind(quiz.target.to_string());
    separated.push_bind(quiz.class_name);
    separated.push_bind(quiz.student_id);
    separated.push_bind(quiz.results_announced);
    separated.push_bind(quiz.pass_percentage);
    separated.push_bind(Json(quiz.questions));
}

#[async_trait]
impl QuizStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, role, student_id, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up user: {:?}", e);
            AppError::from(e)
        })?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password, role, student_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password, role, student_id, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .bind(&user.role)
        .bind(user.student_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::from(e)
            }
        })
    }

    async fn create_student(
        &self,
        student: NewStudent,
        password_hash: String,
    ) -> Result<Student, AppError> {
        let conflict = |e: sqlx::Error| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("GR number '{}' already exists", student.gr_number))
            } else {
                tracing::error!("Failed to create student: {:?}", e);
                AppError::from(e)
            }
        };

        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (name, gr_number, roll_number, class_name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, gr_number, roll_number, class_name, created_at
            "#,
        )
        .bind(&student.name)
        .bind(&student.gr_number)
        .bind(&student.roll_number)
        .bind(&student.class_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict)?;

        sqlx::query("INSERT INTO users (username, password, role, student_id) VALUES ($1, $2, $3, $4)")
            .bind(&record.gr_number)
            .bind(&password_hash)
            .bind(ROLE_STUDENT)
            .bind(record.id)
            .execute(&mut *tx)
            .await
            .map_err(conflict)?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, AppError> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, name, gr_number, roll_number, class_name, created_at FROM students WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn list_students(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError> {
        let students = sqlx::query_as::<_, Student>(
            r#"
            SELECT id, name, gr_number, roll_number, class_name, created_at
            FROM students
            WHERE ($1::TEXT IS NULL OR class_name = $1)
            ORDER BY class_name, roll_number
            "#,
        )
        .bind(class_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list students: {:?}", e);
            AppError::from(e)
        })?;
        Ok(students)
    }

    async fn delete_student(&self, id: i64) -> Result<bool, AppError> {
        // Linked login goes with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO quizzes (title, subject, exam_key, duration_minutes, question_limit, \
             target, class_name, student_id, results_announced, pass_percentage, questions) VALUES (",
        );
        bind_quiz_fields(&mut builder, quiz);
        builder.push(") RETURNING ");
        builder.push(QUIZ_COLUMNS);

        let row: QuizRow = builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create quiz: {:?}", e);
                AppError::from(e)
            })?;
        row.try_into()
    }

    async fn update_quiz(&self, id: i64, quiz: NewQuiz) -> Result<Option<Quiz>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "UPDATE quizzes SET (title, subject, exam_key, duration_minutes, question_limit, \
             target, class_name, student_id, results_announced, pass_percentage, questions) = (",
        );
        bind_quiz_fields(&mut builder, quiz);
        builder.push(") WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(QUIZ_COLUMNS);

        let row: Option<QuizRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update quiz: {:?}", e);
                AppError::from(e)
            })?;
        row.map(Quiz::try_from).transpose()
    }

    async fn set_results_announced(&self, id: i64, announced: bool) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE quizzes SET results_announced = $1 WHERE id = $2")
            .bind(announced)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS);
        let row = sqlx::query_as::<_, QuizRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Quiz::try_from).transpose()
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(QUIZ_COLUMNS);
        builder.push(" FROM quizzes WHERE TRUE");

        if let Some(id) = filter.id {
            builder.push(" AND id = ");
            builder.push_bind(id);
        }

        if filter.student_id.is_some() || filter.class_name.is_some() {
            builder.push(" AND (target = 'all'");
            if let Some(class_name) = &filter.class_name {
                builder.push(" OR (target = 'class' AND class_name = ");
                builder.push_bind(class_name.clone());
                builder.push(")");
            }
            if let Some(student_id) = filter.student_id {
                builder.push(" OR (target = 'student' AND student_id = ");
                builder.push_bind(student_id);
                builder.push(")");
            }
            builder.push(")");
        }

        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows: Vec<QuizRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list quizzes: {:?}", e);
                AppError::from(e)
            })?;
        rows.into_iter().map(Quiz::try_from).collect()
    }

    async fn create_attempt_if_absent(
        &self,
        attempt: NewAttempt,
    ) -> Result<(Attempt, bool), AppError> {
        let answers = attempt.blank_answers();
        let sql = format!(
            r#"
            INSERT INTO quiz_attempts
            (quiz_id, student_id, student_name, student_gr_number, student_roll_number,
             class_name, question_order, answers, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (quiz_id, student_id) DO NOTHING
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );

        let inserted = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt.quiz_id)
            .bind(attempt.student_id)
            .bind(&attempt.student_name)
            .bind(&attempt.student_gr_number)
            .bind(&attempt.student_roll_number)
            .bind(&attempt.class_name)
            .bind(Json(attempt.question_order.clone()))
            .bind(Json(answers))
            .bind(attempt.started_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create attempt: {:?}", e);
                AppError::from(e)
            })?;

        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        let existing = self
            .find_attempt(attempt.quiz_id, attempt.student_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(format!(
                    "attempt for quiz {} / student {} vanished after conflict",
                    attempt.quiz_id, attempt.student_id
                ))
            })?;
        Ok((existing, false))
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!("SELECT {} FROM quiz_attempts WHERE id = $1", ATTEMPT_COLUMNS);
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Attempt::from))
    }

    async fn find_attempt(
        &self,
        quiz_id: i64,
        student_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {} FROM quiz_attempts WHERE quiz_id = $1 AND student_id = $2",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(quiz_id)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Attempt::from))
    }

    async fn save_answers(
        &self,
        id: i64,
        answers: &[i32],
        expected_version: Option<i64>,
    ) -> Result<SaveOutcome, AppError> {
        let saved: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE quiz_attempts
            SET answers = $2, version = version + 1
            WHERE id = $1
              AND submitted_at IS NULL
              AND ($3::BIGINT IS NULL OR version = $3)
            RETURNING version
            "#,
        )
        .bind(id)
        .bind(Json(answers.to_vec()))
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save answers: {:?}", e);
            AppError::from(e)
        })?;

        if let Some((version,)) = saved {
            return Ok(SaveOutcome::Saved { version });
        }

        // Nothing written: work out why.
        Ok(match self.get_attempt(id).await? {
            None => SaveOutcome::Missing,
            Some(a) if a.is_finalized() => SaveOutcome::Finalized,
            Some(a) => SaveOutcome::VersionMismatch { current: a.version },
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
        let sql = format!(
            r#"
            UPDATE quiz_attempts
            SET answers = $2, score = $3, submitted_at = $4, late = $5, version = version + 1
            WHERE id = $1 AND submitted_at IS NULL
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(id)
            .bind(Json(answers.to_vec()))
            .bind(score)
            .bind(submitted_at)
            .bind(late)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to finalize attempt {}: {:?}", id, e);
                AppError::from(e)
            })?;
        Ok(row.map(Attempt::from))
    }

    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT
                a.id, a.quiz_id, a.student_id, a.student_name, a.student_gr_number,
                a.student_roll_number, a.class_name, a.question_order, a.answers, a.score,
                a.started_at, a.submitted_at, a.late, a.version,
                q.title AS quiz_title,
                q.subject AS quiz_subject,
                q.results_announced,
                q.pass_percentage
            FROM quiz_attempts a
            LEFT JOIN quizzes q ON q.id = a.quiz_id
            WHERE a.submitted_at IS NOT NULL
            "#,
        );

        if let Some(student_id) = filter.student_id {
            builder.push(" AND a.student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(quiz_id) = filter.quiz_id {
            builder.push(" AND a.quiz_id = ");
            builder.push_bind(quiz_id);
        }
        if let Some(class_name) = &filter.class_name {
            builder.push(" AND a.class_name = ");
            builder.push_bind(class_name.clone());
        }
        if let Some(since) = filter.submitted_since {
            builder.push(" AND a.submitted_at >= ");
            builder.push_bind(since);
        }

        builder.push(" ORDER BY a.submitted_at DESC, a.id DESC LIMIT ");
        builder.push_bind(filter.limit);

        let rows: Vec<ResultRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list results: {:?}", e);
                AppError::from(e)
            })?;

        Ok(rows
            .into_iter()
            .map(|r| ResultRecord {
                attempt: r.attempt.into(),
                quiz_title: r.quiz_title,
                quiz_subject: r.quiz_subject,
                results_announced: r.results_announced,
                pass_percentage: r.pass_percentage,
            })
            .collect())
    }

    async fn class_results(
        &self,
        quiz_id: i64,
        class_name: &str,
    ) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM quiz_attempts
            WHERE quiz_id = $1 AND class_name = $2 AND submitted_at IS NOT NULL
            ORDER BY score DESC, submitted_at ASC, id ASC
            "#,
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(quiz_id)
            .bind(class_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load class results: {:?}", e);
                AppError::from(e)
            })?;
        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn delete_results(
        &self,
        quiz_id: i64,
        class_name: Option<&str>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM quiz_attempts WHERE quiz_id = $1 AND ($2::TEXT IS NULL OR class_name = $2)",
        )
        .bind(quiz_id)
        .bind(class_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete results: {:?}", e);
            AppError::from(e)
        })?;
        Ok(result.rows_affected())
    }
}
