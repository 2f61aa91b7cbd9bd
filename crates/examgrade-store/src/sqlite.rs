//! SQLite-backed store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use examgrade_core::error::GradeError;
use examgrade_core::model::{
    option_letter, round2, Evaluation, Exam, ModelSpec, NewEvaluation, NewQuestionEvaluation,
    Question, QuestionOption, QuestionRecord,
};
use examgrade_core::traits::EvaluationStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS courses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        owner TEXT
    );

    CREATE TABLE IF NOT EXISTS exams (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        description TEXT NOT NULL,
        course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        owner TEXT
    );

    CREATE TABLE IF NOT EXISTS questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        statement TEXT NOT NULL,
        correct_option_id INTEGER REFERENCES question_options(id),
        exam_id INTEGER NOT NULL REFERENCES exams(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS question_options (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE
    );

    -- api_url and api_key are both set for external models, owner only for those.
    CREATE TABLE IF NOT EXISTS models (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        description TEXT NOT NULL,
        api_url TEXT,
        api_key TEXT,
        owner TEXT
    );

    CREATE TABLE IF NOT EXISTS evaluations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt TEXT NOT NULL,
        ev_date TEXT NOT NULL,
        grade REAL NOT NULL,
        time REAL NOT NULL,
        model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
        exam_id INTEGER NOT NULL REFERENCES exams(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS question_evaluations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        evaluation_id INTEGER NOT NULL REFERENCES evaluations(id) ON DELETE CASCADE,
        question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
        question_option_id INTEGER NOT NULL REFERENCES question_options(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_questions_exam ON questions(exam_id);
    CREATE INDEX IF NOT EXISTS idx_evaluations_exam ON evaluations(exam_id, ev_date);
"#;

/// One row of [`SqliteStore::list_exams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSummary {
    pub id: i64,
    pub description: String,
    pub course: String,
    pub question_count: usize,
}

/// A stored course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSummary {
    pub id: i64,
    pub name: String,
    pub owner: Option<String>,
}

/// Which evaluations [`SqliteStore::model_averages`] aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisScope {
    All,
    Course(i64),
    Exam(i64),
}

/// Mean grade and time of one model over a set of evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAverage {
    pub model: String,
    pub evaluations: usize,
    /// Two decimals, like stored grades.
    pub grade: f64,
    /// Seconds, two decimals.
    pub time: f64,
}

/// A stored evaluation with the name of the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub evaluation: Evaluation,
    pub model: String,
}

/// Exams, models and evaluations in one SQLite database.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;
        tracing::debug!("opened database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Store a parsed exam under `course`, all or nothing.
    ///
    /// The course is reused if one with the same name and owner exists.
    /// Returns the stored exam graph.
    pub fn import_exam(
        &self,
        course: &str,
        description: &str,
        owner: Option<&str>,
        questions: &[QuestionRecord],
    ) -> Result<Exam> {
        let course = course.trim();
        let description = description.trim();
        if course.is_empty() {
            bail!("course name is required");
        }
        if description.is_empty() {
            bail!("exam description is required");
        }
        if questions.is_empty() {
            bail!("exam {description} has no questions");
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let course_id = match tx
            .query_row(
                "SELECT id FROM courses WHERE name = ?1 AND owner IS ?2",
                params![course, owner],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
        {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO courses (name, owner) VALUES (?1, ?2)",
                    params![course, owner],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO exams (description, course_id, owner) VALUES (?1, ?2, ?3)",
            params![description, course_id, owner],
        )?;
        let exam_id = tx.last_insert_rowid();

        for (index, record) in questions.iter().enumerate() {
            tx.execute(
                "INSERT INTO questions (statement, exam_id) VALUES (?1, ?2)",
                params![record.statement, exam_id],
            )?;
            let question_id = tx.last_insert_rowid();

            let mut correct_id = None;
            for option in &record.options {
                tx.execute(
                    "INSERT INTO question_options (content, question_id) VALUES (?1, ?2)",
                    params![option, question_id],
                )?;
                if option_letter(option) == Some(record.correct_option_letter) {
                    correct_id = Some(tx.last_insert_rowid());
                }
            }

            let Some(correct_id) = correct_id else {
                bail!(
                    "question {} has no option labelled '{}'",
                    index + 1,
                    record.correct_option_letter
                );
            };
            tx.execute(
                "UPDATE questions SET correct_option_id = ?1 WHERE id = ?2",
                params![correct_id, question_id],
            )?;
        }

        tx.commit().context("failed to commit exam import")?;
        tracing::info!(
            exam = exam_id,
            questions = questions.len(),
            "imported exam {description} into course {course}"
        );

        load_exam(&conn, exam_id)
    }

    /// Get or create the stored row for `spec`; returns the spec with its id.
    pub fn ensure_model(&self, spec: &ModelSpec) -> Result<ModelSpec> {
        let conn = self.conn()?;
        let id = ensure_model(&conn, spec)?;
        Ok(ModelSpec {
            id: Some(id),
            ..spec.clone()
        })
    }

    /// Rebuild an exam and its questions and options, in stored order.
    pub fn load_exam(&self, id: i64) -> Result<Exam> {
        let conn = self.conn()?;
        load_exam(&conn, id)
    }

    pub fn list_exams(&self) -> Result<Vec<ExamSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.description, c.name,
                    (SELECT COUNT(*) FROM questions q WHERE q.exam_id = e.id)
             FROM exams e JOIN courses c ON c.id = e.course_id
             ORDER BY e.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ExamSummary {
                id: row.get(0)?,
                description: row.get(1)?,
                course: row.get(2)?,
                question_count: row.get::<_, i64>(3)? as usize,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list exams")
    }

    /// Every evaluation of an exam, oldest first.
    pub fn evaluations_for_exam(&self, exam_id: i64) -> Result<Vec<EvaluationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ev.id, ev.prompt, ev.ev_date, ev.grade, ev.time, ev.model_id, ev.exam_id,
                    m.description
             FROM evaluations ev JOIN models m ON m.id = ev.model_id
             WHERE ev.exam_id = ?1
             ORDER BY ev.ev_date, ev.id",
        )?;
        let rows = stmt.query_map(params![exam_id], |row| {
            Ok(EvaluationRecord {
                evaluation: Evaluation {
                    id: row.get(0)?,
                    prompt: row.get(1)?,
                    ev_date: row.get::<_, DateTime<Utc>>(2)?,
                    grade: row.get(3)?,
                    time: row.get(4)?,
                    model_id: row.get(5)?,
                    exam_id: row.get(6)?,
                },
                model: row.get(7)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to load evaluations for exam {exam_id}"))
    }

    pub fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, owner FROM courses ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(CourseSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                owner: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list courses")
    }

    /// Average grade and time per model description, sorted by model.
    ///
    /// Models without evaluations in `scope` are left out.
    pub fn model_averages(&self, scope: AnalysisScope) -> Result<Vec<ModelAverage>> {
        let (course_id, exam_id) = match scope {
            AnalysisScope::All => (None, None),
            AnalysisScope::Course(id) => (Some(id), None),
            AnalysisScope::Exam(id) => (None, Some(id)),
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.description, COUNT(*), AVG(ev.grade), AVG(ev.time)
             FROM evaluations ev
             JOIN models m ON m.id = ev.model_id
             JOIN exams e ON e.id = ev.exam_id
             WHERE (?1 IS NULL OR e.course_id = ?1) AND (?2 IS NULL OR ev.exam_id = ?2)
             GROUP BY m.description
             ORDER BY m.description",
        )?;
        let rows = stmt.query_map(params![course_id, exam_id], |row| {
            Ok(ModelAverage {
                model: row.get(0)?,
                evaluations: row.get::<_, i64>(1)? as usize,
                grade: round2(row.get(2)?),
                time: round2(row.get(3)?),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to average evaluations ({scope:?})"))
    }

    /// Question evaluations recorded for one evaluation, in question order.
    pub fn question_evaluations(&self, evaluation_id: i64) -> Result<Vec<NewQuestionEvaluation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT question_id, question_option_id FROM question_evaluations
             WHERE evaluation_id = ?1 ORDER BY question_id",
        )?;
        let rows = stmt.query_map(params![evaluation_id], |row| {
            Ok(NewQuestionEvaluation {
                question_id: row.get(0)?,
                option_id: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Write an evaluation and its question evaluations in one transaction.
    ///
    /// A model without an id is stored first, inside the same transaction.
    pub fn commit(&self, evaluation: &NewEvaluation) -> Result<i64> {
        let mut conn = self.conn()?;
        commit(&mut conn, evaluation)
    }
}

fn ensure_model(conn: &Connection, spec: &ModelSpec) -> Result<i64> {
    if spec.description.trim().is_empty() {
        bail!("model description is required");
    }
    if spec.is_half_configured() {
        bail!(
            "model {}: API URL and API key must be set together",
            spec.description
        );
    }
    spec.check_ownership()?;

    if spec.is_external() {
        let existing = conn
            .query_row(
                "SELECT id FROM models
                 WHERE description = ?1 AND owner = ?2 AND api_url IS NOT NULL",
                params![spec.description, spec.owner],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(id) = existing {
            conn.execute(
                "UPDATE models SET api_url = ?1, api_key = ?2 WHERE id = ?3",
                params![spec.api_url, spec.api_key, id],
            )?;
            return Ok(id);
        }
    } else {
        let existing = conn
            .query_row(
                "SELECT id FROM models
                 WHERE description = ?1 AND api_url IS NULL AND api_key IS NULL",
                params![spec.description],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
    }

    conn.execute(
        "INSERT INTO models (description, api_url, api_key, owner) VALUES (?1, ?2, ?3, ?4)",
        params![spec.description, spec.api_url, spec.api_key, spec.owner],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(model = id, "registered model {}", spec.description);
    Ok(id)
}

fn load_exam(conn: &Connection, id: i64) -> Result<Exam> {
    let (description, course) = conn
        .query_row(
            "SELECT e.description, c.name
             FROM exams e JOIN courses c ON c.id = e.course_id
             WHERE e.id = ?1",
            params![id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
        .ok_or_else(|| anyhow!("exam {id} not found"))?;

    let mut options: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT o.id, o.content, o.question_id
             FROM question_options o JOIN questions q ON q.id = o.question_id
             WHERE q.exam_id = ?1
             ORDER BY o.id",
        )?;
        let mut rows = stmt.query(params![id])?;
        while let Some(row) = rows.next()? {
            let question_id: i64 = row.get(2)?;
            options.entry(question_id).or_default().push(QuestionOption {
                id: row.get(0)?,
                content: row.get(1)?,
            });
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, statement, correct_option_id FROM questions WHERE exam_id = ?1 ORDER BY id",
    )?;
    let questions = stmt
        .query_map(params![id], |row| {
            let question_id: i64 = row.get(0)?;
            Ok(Question {
                id: question_id,
                statement: row.get(1)?,
                options: options.remove(&question_id).unwrap_or_default(),
                correct_option_id: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Exam {
        id,
        description,
        course,
        questions,
    })
}

fn commit(conn: &mut Connection, evaluation: &NewEvaluation) -> Result<i64> {
    let tx = conn.transaction()?;

    let model_id = match evaluation.model.id {
        Some(id) => id,
        None => ensure_model(&tx, &evaluation.model)?,
    };

    tx.execute(
        "INSERT INTO evaluations (prompt, ev_date, grade, time, model_id, exam_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            evaluation.prompt,
            evaluation.ev_date,
            evaluation.grade,
            evaluation.time,
            model_id,
            evaluation.exam_id
        ],
    )?;
    let evaluation_id = tx.last_insert_rowid();

    {
        let mut insert = tx.prepare(
            "INSERT INTO question_evaluations (evaluation_id, question_id, question_option_id)
             VALUES (?1, ?2, ?3)",
        )?;
        for row in &evaluation.question_evaluations {
            insert.execute(params![evaluation_id, row.question_id, row.option_id])?;
        }
    }

    tx.commit()?;
    Ok(evaluation_id)
}

#[async_trait]
impl EvaluationStore for SqliteStore {
    async fn commit_evaluation(&self, evaluation: NewEvaluation) -> Result<i64, GradeError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.commit(&evaluation))
            .await
            .map_err(|e| GradeError::Persistence(e.to_string()))?
            .map_err(|e| GradeError::Persistence(format!("{e:#}")))
    }
}
