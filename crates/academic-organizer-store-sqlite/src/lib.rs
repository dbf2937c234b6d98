use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use academic_organizer_core::{
    ClockTime, Course, GradeComponent, Instructor, Schedule, Semester, Term, Weekday,
};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 2;
const COURSES_SNAPSHOT_FILE: &str = "courses.ndjson";

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS instructors (
  instructor_id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL CHECK (length(name) > 0),
  email TEXT,
  office_hours TEXT,
  office_location TEXT,
  contact_info TEXT
);

CREATE TABLE IF NOT EXISTS courses (
  course_id INTEGER PRIMARY KEY AUTOINCREMENT,
  code TEXT NOT NULL UNIQUE CHECK (length(code) BETWEEN 1 AND 20),
  name TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 100),
  description TEXT,
  semester TEXT CHECK (semester IS NULL OR semester IN ('Fall', 'Spring', 'Summer', 'Winter')),
  year INTEGER,
  syllabus_path TEXT,
  start_time TEXT,
  end_time TEXT,
  location TEXT,
  instructor_id INTEGER NOT NULL REFERENCES instructors(instructor_id),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS course_schedules (
  course_id INTEGER NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
  day TEXT NOT NULL CHECK (
    day IN ('Monday', 'Tuesday', 'Wednesday', 'Thursday', 'Friday', 'Saturday', 'Sunday')
  ),
  PRIMARY KEY (course_id, day)
);

CREATE INDEX IF NOT EXISTS idx_courses_instructor ON courses(instructor_id);
";

const MIGRATION_002_ADD_SOURCE_HASH_SQL: &str = r"
ALTER TABLE courses ADD COLUMN source_hash TEXT;
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS course_textbooks (
  course_id INTEGER NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
  position INTEGER NOT NULL CHECK (position >= 0),
  title TEXT NOT NULL CHECK (length(title) > 0),
  PRIMARY KEY (course_id, position)
);

CREATE TABLE IF NOT EXISTS grading_components (
  course_id INTEGER NOT NULL REFERENCES courses(course_id) ON DELETE CASCADE,
  position INTEGER NOT NULL CHECK (position >= 0),
  category TEXT NOT NULL CHECK (length(category) > 0),
  weight INTEGER NOT NULL CHECK (weight BETWEEN 0 AND 100),
  PRIMARY KEY (course_id, position)
);

CREATE INDEX IF NOT EXISTS idx_courses_term ON courses(year, semester);
";

const COURSE_SELECT_SQL: &str = r"
SELECT
  c.course_id, c.code, c.name, c.description, c.semester, c.year,
  c.syllabus_path, c.source_hash, c.start_time, c.end_time, c.location,
  c.created_at, c.updated_at,
  i.name, i.email, i.office_hours, i.office_location, i.contact_info
FROM courses c
JOIN instructors i ON i.instructor_id = c.instructor_id
";

/// Course persistence over one `SQLite` connection.
pub struct CourseRepository {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub schema_version: i64,
    pub exported_at: String,
    pub files: Vec<ExportFileDigest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported_courses: usize,
    pub skipped_existing_courses: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: i64,
    pub parent: String,
    pub fk_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub foreign_key_violations: Vec<ForeignKeyViolation>,
    pub schema_status: SchemaStatus,
}

#[derive(Debug)]
struct CourseRow {
    course_id: i64,
    code: String,
    name: String,
    description: Option<String>,
    semester: Option<String>,
    year: Option<i32>,
    syllabus_path: Option<String>,
    source_hash: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    location: Option<String>,
    created_at: String,
    updated_at: String,
    instructor: Instructor,
}

impl CourseRepository {
    /// Open a SQLite-backed course store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let (current_version, inferred_from_legacy) = detect_effective_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            inferred_from_legacy,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails,
    /// or when the database carries a newer schema than this build understands.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            version = self.bootstrap_schema_version()?;
        }

        if version < 2 {
            self.apply_migration_2()?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    fn bootstrap_schema_version(&self) -> Result<i64> {
        if !table_exists(&self.conn, "courses")? {
            apply_migration_1(&self.conn)?;
            return Ok(1);
        }

        if !table_has_column(&self.conn, "courses", "code")? {
            return Err(anyhow!("database schema is invalid: courses table has no code column"));
        }

        if table_has_column(&self.conn, "courses", "source_hash")?
            && table_exists(&self.conn, "course_textbooks")?
        {
            // Tables already in v2 shape, but migration rows were never recorded.
            record_schema_version(&self.conn, 1)?;
            record_schema_version(&self.conn, 2)?;
            return Ok(2);
        }

        record_schema_version(&self.conn, 1)?;
        Ok(1)
    }

    fn apply_migration_2(&mut self) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start migration v2 transaction")?;

        if !table_has_column(&tx, "courses", "source_hash")? {
            tx.execute_batch(MIGRATION_002_ADD_SOURCE_HASH_SQL)
                .context("failed to add courses.source_hash column")?;
        }
        tx.execute_batch(MIGRATION_002_SQL).context("failed to apply migration v2")?;
        record_schema_version(&tx, 2)?;

        tx.commit().context("failed to commit migration v2")?;
        tracing::info!(version = 2, "applied schema migration");
        Ok(())
    }

    /// Persist one validated course together with its instructor and child rows.
    ///
    /// # Errors
    /// Returns an error when validation fails, the code already exists, or any
    /// write in the transaction fails.
    pub fn insert_course(&mut self, course: &Course) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start transaction")?;
        insert_course_tx(&tx, course)?;
        tx.commit().context("failed to commit course insert")?;
        Ok(())
    }

    /// Load one course by its exact code.
    ///
    /// # Errors
    /// Returns an error when the query fails or stored values cannot be decoded.
    pub fn get_course(&self, code: &str) -> Result<Option<Course>> {
        let row = self
            .conn
            .query_row(&format!("{COURSE_SELECT_SQL} WHERE c.code = ?1"), params![code], course_row)
            .optional()
            .with_context(|| format!("failed to load course {code}"))?;

        row.map(|row| self.hydrate_course(row)).transpose()
    }

    /// List every stored course ordered by code.
    ///
    /// # Errors
    /// Returns an error when the query fails or stored values cannot be decoded.
    pub fn list_courses(&self) -> Result<Vec<Course>> {
        self.query_courses(&format!("{COURSE_SELECT_SQL} ORDER BY c.code ASC"), [])
    }

    /// Case-insensitive substring search over course code and name.
    ///
    /// # Errors
    /// Returns an error when the query fails or stored values cannot be decoded.
    pub fn search_courses(&self, query: &str) -> Result<Vec<Course>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        self.query_courses(
            &format!(
                "{COURSE_SELECT_SQL}
                 WHERE c.code LIKE ?1 ESCAPE '\\' OR c.name LIKE ?1 ESCAPE '\\'
                 ORDER BY c.code ASC"
            ),
            params![pattern],
        )
    }

    /// List the courses held in one semester of one year.
    ///
    /// # Errors
    /// Returns an error when the query fails or stored values cannot be decoded.
    pub fn list_courses_by_term(&self, semester: Semester, year: i32) -> Result<Vec<Course>> {
        self.query_courses(
            &format!(
                "{COURSE_SELECT_SQL} WHERE c.semester = ?1 AND c.year = ?2 ORDER BY c.code ASC"
            ),
            params![semester.as_str(), year],
        )
    }

    /// Check whether a course with this exact code is stored.
    ///
    /// # Errors
    /// Returns an error when the existence query fails.
    pub fn course_exists(&self, code: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM courses WHERE code = ?1)",
                params![code],
                |row| row.get::<_, i64>(0),
            )
            .with_context(|| format!("failed to check existence of course {code}"))?;
        Ok(exists == 1)
    }

    /// Replace every mutable field of a stored course. `created_at` is kept as stored.
    ///
    /// Returns `false` when no course with `course.code` exists.
    ///
    /// # Errors
    /// Returns an error when validation fails or any write in the transaction fails.
    pub fn update_course(&mut self, course: &Course) -> Result<bool> {
        course.validate().map_err(|err| anyhow!("course validation failed: {err}"))?;

        let tx = self.conn.transaction().context("failed to start transaction")?;

        let Some((course_id, instructor_id)) = course_ids_for_code(&tx, &course.code)? else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE instructors
             SET name = ?1, email = ?2, office_hours = ?3, office_location = ?4, contact_info = ?5
             WHERE instructor_id = ?6",
            params![
                course.instructor.name,
                course.instructor.email,
                course.instructor.office_hours,
                course.instructor.office_location,
                course.instructor.contact_info,
                instructor_id,
            ],
        )
        .context("failed to update instructor row")?;

        tx.execute(
            "UPDATE courses
             SET name = ?1, description = ?2, semester = ?3, year = ?4, syllabus_path = ?5,
                 source_hash = ?6, start_time = ?7, end_time = ?8, location = ?9, updated_at = ?10
             WHERE course_id = ?11",
            params![
                course.name,
                course.description,
                course.term.map(|term| term.semester.as_str()),
                course.term.map(|term| term.year),
                course.syllabus_path,
                course.source_hash,
                course.schedule.start_time.map(|value| value.to_string()),
                course.schedule.end_time.map(|value| value.to_string()),
                course.schedule.location,
                rfc3339(course.updated_at)?,
                course_id,
            ],
        )
        .with_context(|| format!("failed to update course row {}", course.code))?;

        delete_course_children(&tx, course_id)?;
        insert_course_children(&tx, course_id, course)?;

        tx.commit().context("failed to commit course update")?;
        Ok(true)
    }

    /// Remove a course, its schedule/textbook/grading rows, and its instructor
    /// once no other course references it.
    ///
    /// Returns `false` when no course with `code` exists.
    ///
    /// # Errors
    /// Returns an error when any delete in the transaction fails.
    pub fn delete_course(&mut self, code: &str) -> Result<bool> {
        let tx = self.conn.transaction().context("failed to start transaction")?;

        let Some((course_id, instructor_id)) = course_ids_for_code(&tx, code)? else {
            return Ok(false);
        };

        delete_course_children(&tx, course_id)?;
        tx.execute("DELETE FROM courses WHERE course_id = ?1", params![course_id])
            .with_context(|| format!("failed to delete course {code}"))?;
        tx.execute(
            "DELETE FROM instructors
             WHERE instructor_id = ?1
               AND NOT EXISTS (SELECT 1 FROM courses WHERE instructor_id = ?1)",
            params![instructor_id],
        )
        .context("failed to delete orphaned instructor")?;

        tx.commit().context("failed to commit course delete")?;
        Ok(true)
    }

    /// Export all courses as NDJSON plus a digest manifest.
    ///
    /// # Errors
    /// Returns an error when export files cannot be created, written, or serialized.
    pub fn export_snapshot(&self, out_dir: &Path) -> Result<ExportManifest> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

        let courses = self.list_courses()?;
        let courses_path = out_dir.join(COURSES_SNAPSHOT_FILE);
        let (sha256, records) = write_ndjson_file(&courses_path, &courses)?;

        let manifest = ExportManifest {
            schema_version: LATEST_SCHEMA_VERSION,
            exported_at: now_rfc3339()?,
            files: vec![ExportFileDigest {
                path: COURSES_SNAPSHOT_FILE.to_string(),
                sha256,
                records,
            }],
        };

        let manifest_path = out_dir.join("manifest.json");
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).context("failed to serialize export manifest")?;
        fs::write(&manifest_path, manifest_json).with_context(|| {
            format!("failed to write export manifest {}", manifest_path.display())
        })?;

        Ok(manifest)
    }

    /// Import an exported snapshot directory into this database.
    ///
    /// # Errors
    /// Returns an error when migration, manifest verification, parsing, duplicate
    /// handling, or writes fail.
    pub fn import_snapshot(&mut self, in_dir: &Path, skip_existing: bool) -> Result<ImportSummary> {
        self.migrate()?;
        let manifest_path = in_dir.join("manifest.json");
        let manifest = read_export_manifest(&manifest_path)?;
        validate_import_manifest(in_dir, &manifest)?;

        let courses = read_ndjson_file::<Course>(&in_dir.join(COURSES_SNAPSHOT_FILE))?;
        let mut summary = ImportSummary { imported_courses: 0, skipped_existing_courses: 0 };

        // One transaction for the whole snapshot: any failure leaves the store untouched.
        let tx = self.conn.transaction().context("failed to start snapshot import transaction")?;
        for course in &courses {
            if course_ids_for_code(&tx, &course.code)?.is_some() {
                if skip_existing {
                    summary.skipped_existing_courses += 1;
                    continue;
                }

                return Err(anyhow!("course already exists: {}", course.code));
            }
            insert_course_tx(&tx, course)?;
            summary.imported_courses += 1;
        }
        tx.commit().context("failed to commit snapshot import")?;

        tracing::info!(
            imported = summary.imported_courses,
            skipped = summary.skipped_existing_courses,
            "imported course snapshot"
        );
        Ok(summary)
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, then migrate to latest.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<()> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;

        self.migrate()?;
        Ok(())
    }

    /// Run quick-check, foreign-key-check, and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let mut stmt = self
            .conn
            .prepare("PRAGMA foreign_key_check")
            .context("failed to prepare PRAGMA foreign_key_check")?;
        let rows = stmt.query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })?;

        let mut foreign_key_violations = Vec::new();
        for row in rows {
            foreign_key_violations.push(row?);
        }

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            foreign_key_violations,
            schema_status,
        })
    }

    fn query_courses(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Course>> {
        let mut stmt = self.conn.prepare(sql).context("failed to prepare course query")?;
        let rows = stmt.query_map(params, course_row).context("failed to query courses")?;

        let mut courses = Vec::new();
        for row in rows {
            courses.push(self.hydrate_course(row?)?);
        }
        Ok(courses)
    }

    fn hydrate_course(&self, row: CourseRow) -> Result<Course> {
        let term = match (row.semester.as_deref(), row.year) {
            (Some(semester), Some(year)) => Some(Term {
                semester: Semester::parse(semester)
                    .ok_or_else(|| anyhow!("invalid stored semester: {semester}"))?,
                year,
            }),
            _ => None,
        };

        let mut days = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT day FROM course_schedules WHERE course_id = ?1")
                .context("failed to prepare schedule query")?;
            let rows = stmt.query_map(params![row.course_id], |row| row.get::<_, String>(0))?;
            for day in rows {
                let day = day?;
                days.push(
                    Weekday::parse(&day).ok_or_else(|| anyhow!("invalid stored weekday: {day}"))?,
                );
            }
        }
        days.sort_unstable();

        let mut textbooks = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT title FROM course_textbooks WHERE course_id = ?1 ORDER BY position ASC",
                )
                .context("failed to prepare textbook query")?;
            let rows = stmt.query_map(params![row.course_id], |row| row.get::<_, String>(0))?;
            for title in rows {
                textbooks.push(title?);
            }
        }

        let mut grading = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT category, weight FROM grading_components
                     WHERE course_id = ?1 ORDER BY position ASC",
                )
                .context("failed to prepare grading query")?;
            let rows = stmt.query_map(params![row.course_id], |row| {
                Ok(GradeComponent { category: row.get(0)?, weight: row.get(1)? })
            })?;
            for component in rows {
                grading.push(component?);
            }
        }

        Ok(Course {
            code: row.code,
            name: row.name,
            description: row.description,
            instructor: row.instructor,
            schedule: Schedule {
                days,
                start_time: parse_clock_time(row.start_time.as_deref())?,
                end_time: parse_clock_time(row.end_time.as_deref())?,
                location: row.location,
            },
            term,
            syllabus_path: row.syllabus_path,
            source_hash: row.source_hash,
            textbooks,
            grading,
            created_at: parse_rfc3339(&row.created_at)?,
            updated_at: parse_rfc3339(&row.updated_at)?,
        })
    }
}

fn course_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        course_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        semester: row.get(4)?,
        year: row.get(5)?,
        syllabus_path: row.get(6)?,
        source_hash: row.get(7)?,
        start_time: row.get(8)?,
        end_time: row.get(9)?,
        location: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        instructor: Instructor {
            name: row.get(13)?,
            email: row.get(14)?,
            office_hours: row.get(15)?,
            office_location: row.get(16)?,
            contact_info: row.get(17)?,
        },
    })
}

fn course_ids_for_code(conn: &Connection, code: &str) -> Result<Option<(i64, i64)>> {
    conn.query_row(
        "SELECT course_id, instructor_id FROM courses WHERE code = ?1",
        params![code],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )
    .optional()
    .with_context(|| format!("failed to look up course id for {code}"))
}

fn insert_course_tx(tx: &Transaction<'_>, course: &Course) -> Result<()> {
    course.validate().map_err(|err| anyhow!("course validation failed: {err}"))?;

    if course_ids_for_code(tx, &course.code)?.is_some() {
        return Err(anyhow!("course already exists: {}", course.code));
    }

    tx.execute(
        "INSERT INTO instructors(name, email, office_hours, office_location, contact_info)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            course.instructor.name,
            course.instructor.email,
            course.instructor.office_hours,
            course.instructor.office_location,
            course.instructor.contact_info,
        ],
    )
    .context("failed to insert instructor row")?;
    let instructor_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO courses(
            code, name, description, semester, year, syllabus_path, source_hash,
            start_time, end_time, location, instructor_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            course.code,
            course.name,
            course.description,
            course.term.map(|term| term.semester.as_str()),
            course.term.map(|term| term.year),
            course.syllabus_path,
            course.source_hash,
            course.schedule.start_time.map(|value| value.to_string()),
            course.schedule.end_time.map(|value| value.to_string()),
            course.schedule.location,
            instructor_id,
            rfc3339(course.created_at)?,
            rfc3339(course.updated_at)?,
        ],
    )
    .with_context(|| format!("failed to insert course row {}", course.code))?;
    let course_id = tx.last_insert_rowid();

    insert_course_children(tx, course_id, course)?;
    Ok(())
}

fn insert_course_children(tx: &Transaction<'_>, course_id: i64, course: &Course) -> Result<()> {
    for day in &course.schedule.days {
        tx.execute(
            "INSERT OR IGNORE INTO course_schedules(course_id, day) VALUES (?1, ?2)",
            params![course_id, day.as_str()],
        )
        .context("failed to insert course schedule row")?;
    }

    for (position, title) in (0_i64..).zip(&course.textbooks) {
        tx.execute(
            "INSERT INTO course_textbooks(course_id, position, title) VALUES (?1, ?2, ?3)",
            params![course_id, position, title],
        )
        .context("failed to insert course textbook row")?;
    }

    for (position, component) in (0_i64..).zip(&course.grading) {
        tx.execute(
            "INSERT INTO grading_components(course_id, position, category, weight)
             VALUES (?1, ?2, ?3, ?4)",
            params![course_id, position, component.category, component.weight],
        )
        .context("failed to insert grading component row")?;
    }

    Ok(())
}

fn delete_course_children(tx: &Transaction<'_>, course_id: i64) -> Result<()> {
    for table in ["course_schedules", "course_textbooks", "grading_components"] {
        tx.execute(&format!("DELETE FROM {table} WHERE course_id = ?1"), params![course_id])
            .with_context(|| format!("failed to delete {table} rows"))?;
    }
    Ok(())
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_clock_time(value: Option<&str>) -> Result<Option<ClockTime>> {
    value
        .map(|raw| raw.parse::<ClockTime>().map_err(|err| anyhow!("invalid stored time: {err}")))
        .transpose()
}

fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
    record_schema_version(conn, 1)?;
    tracing::info!(version = 1, "applied schema migration");
    Ok(())
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("failed to inspect table_info for {table}"))?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }

    Ok(false)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn detect_effective_schema_version(conn: &Connection) -> Result<(i64, bool)> {
    let recorded = current_schema_version(conn)?;
    if recorded > 0 {
        return Ok((recorded, false));
    }

    if !table_exists(conn, "courses")? {
        return Ok((0, false));
    }

    if !table_has_column(conn, "courses", "code")? {
        return Err(anyhow!("database schema is invalid: courses table has no code column"));
    }

    if table_has_column(conn, "courses", "source_hash")? && table_exists(conn, "course_textbooks")?
    {
        return Ok((2, true));
    }

    Ok((1, true))
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

fn write_ndjson_file<T: Serialize>(path: &Path, values: &[T]) -> Result<(String, usize)> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();

    for value in values {
        let line = serde_json::to_string(value).context("failed to serialize NDJSON row")?;
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }

    writer.flush().with_context(|| format!("failed to flush export file {}", path.display()))?;

    Ok((format!("{:x}", hasher.finalize()), values.len()))
}

fn read_ndjson_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open NDJSON file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut values = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = serde_json::from_str(trimmed).with_context(|| {
            format!("failed to parse NDJSON row {} from {}", index + 1, path.display())
        })?;
        values.push(value);
    }

    Ok(values)
}

fn read_export_manifest(path: &Path) -> Result<ExportManifest> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read manifest file {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse manifest JSON {}", path.display()))
}

fn ndjson_digest_and_records(path: &Path) -> Result<(String, usize)> {
    let file = File::open(path)
        .with_context(|| format!("failed to open NDJSON file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut records = 0_usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
        if !line.trim().is_empty() {
            records += 1;
        }
    }

    Ok((format!("{:x}", hasher.finalize()), records))
}

fn validate_import_manifest(in_dir: &Path, manifest: &ExportManifest) -> Result<()> {
    if manifest.schema_version <= 0 || manifest.schema_version > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported export schema version {}; supported range is 1..={}",
            manifest.schema_version,
            LATEST_SCHEMA_VERSION
        ));
    }

    let mut by_path: BTreeMap<&str, &ExportFileDigest> = BTreeMap::new();
    for file in &manifest.files {
        if by_path.insert(file.path.as_str(), file).is_some() {
            return Err(anyhow!("manifest contains duplicate file entry: {}", file.path));
        }
    }

    let Some(expected) = by_path.get(COURSES_SNAPSHOT_FILE) else {
        return Err(anyhow!("manifest is missing required file entry: {COURSES_SNAPSHOT_FILE}"));
    };
    let file_path = in_dir.join(COURSES_SNAPSHOT_FILE);
    if !file_path.exists() {
        return Err(anyhow!("manifest references missing file {}", file_path.display()));
    }

    let (actual_sha256, actual_records) = ndjson_digest_and_records(&file_path)?;
    if actual_sha256 != expected.sha256 {
        return Err(anyhow!(
            "manifest digest mismatch for {COURSES_SNAPSHOT_FILE}: expected {}, got {}",
            expected.sha256,
            actual_sha256
        ));
    }
    if actual_records != expected.records {
        return Err(anyhow!(
            "manifest record count mismatch for {COURSES_SNAPSHOT_FILE}: expected {}, got {}",
            expected.records,
            actual_records
        ));
    }

    Ok(())
}
