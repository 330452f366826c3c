//! SQLite storage: connection setup, versioned migrations and the student
//! repository.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::err::Error;
use crate::models::{NewStudent, Student, SubjectAverage};

/// SQLite extended result code for a violated UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create students table",
        statements: &["CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK(length(name) >= 2),
            email TEXT UNIQUE NOT NULL CHECK(email LIKE '%_@_%'),
            subject TEXT NOT NULL CHECK(subject IN ('Math', 'Science', 'English', 'History')),
            grade INTEGER NOT NULL CHECK(grade >= 0 AND grade <= 100),
            created_at TEXT NOT NULL,
            updated_at TEXT
        )"],
    },
    Migration {
        version: 2,
        description: "Index students by subject and creation time",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_students_subject ON students(subject)",
            "CREATE INDEX IF NOT EXISTS idx_students_created_at ON students(created_at)",
        ],
    },
];

// a single connection keeps every write serialized
fn pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

pub async fn connect(db_file: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(true);
    pool_options().connect_with(options).await
}

#[cfg(test)]
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    pool_options().connect_with(options).await
}

/// Applies every migration newer than the recorded schema version.
pub async fn migrate(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let recorded =
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await?;
    log::info!("Current database version: {}", recorded);

    let mut current = recorded;
    for migration in MIGRATIONS.iter().filter(|m| m.version > recorded) {
        log::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.description
        );
        for statement in migration.statements {
            sqlx::query(statement).execute(pool).await?;
        }
        sqlx::query("INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        current = migration.version;
    }

    Ok(current)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE)
                || db.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

fn write_error(err: sqlx::Error) -> Error {
    if is_unique_violation(&err) {
        Error::DuplicateEmail
    } else {
        Error::from(err)
    }
}

#[derive(Clone)]
pub struct StudentRepository {
    pool: SqlitePool,
}

impl StudentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Student>, Error> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT * FROM students ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<Student>, Error> {
        let students = sqlx::query_as::<_, Student>(
            "SELECT * FROM students ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    pub async fn get(&self, id: i64) -> Result<Student, Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Error::student_not_found)
    }

    async fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool, Error> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM students WHERE email = $1 AND ($2 IS NULL OR id != $2) LIMIT 1",
        )
        .bind(email)
        .bind(except)
        .fetch_optional(&self.pool)
        .await?;
        Ok(existing.is_some())
    }

    pub async fn create(&self, student: &NewStudent) -> Result<Student, Error> {
        if self.email_taken(&student.email, None).await? {
            return Err(Error::DuplicateEmail);
        }

        let res = sqlx::query(
            "INSERT INTO students (name, email, subject, grade, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.subject.to_string())
        .bind(student.grade)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.get(res.last_insert_rowid()).await
    }

    pub async fn update(&self, id: i64, student: &NewStudent) -> Result<Student, Error> {
        if self.email_taken(&student.email, Some(id)).await? {
            return Err(Error::DuplicateEmail);
        }

        let res = sqlx::query(
            "UPDATE students SET name = $1, email = $2, subject = $3, grade = $4, updated_at = $5 WHERE id = $6",
        )
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.subject.to_string())
        .bind(student.grade)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if res.rows_affected() < 1 {
            return Err(Error::student_not_found());
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        let res = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() < 1 {
            return Err(Error::student_not_found());
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, Error> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn averages_by_subject(&self) -> Result<Vec<SubjectAverage>, Error> {
        let averages = sqlx::query_as::<_, SubjectAverage>(
            "SELECT subject, AVG(grade) AS average, COUNT(*) AS count
             FROM students GROUP BY subject ORDER BY subject",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(averages)
    }
}
