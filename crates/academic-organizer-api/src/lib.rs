use std::path::Path;

use academic_organizer_core::{normalize_code, Course, ImportResult, Semester, SyllabusExtractor};
use academic_organizer_store_sqlite::CourseRepository;
use anyhow::{anyhow, Result};
use time::OffsetDateTime;

pub mod config;
pub mod document;

pub use config::AppConfig;
pub use document::{DocumentError, DocumentKind, DocumentText, FileTextExtractor, TextExtractor};

pub const MISSING_COURSE_INFO_MESSAGE: &str = "Failed to extract required course information";

/// Business façade over a [`CourseRepository`]: import, lookup, update, delete.
pub struct CourseService {
    repository: CourseRepository,
    documents: Box<dyn TextExtractor>,
    syllabus: SyllabusExtractor,
}

impl CourseService {
    /// Wrap a repository, migrating it to the latest schema.
    ///
    /// # Errors
    /// Returns an error when migrations fail.
    pub fn new(repository: CourseRepository) -> Result<Self> {
        Self::with_extractor(repository, Box::new(FileTextExtractor::new()))
    }

    /// Same as [`CourseService::new`] with a custom document text source.
    ///
    /// # Errors
    /// Returns an error when migrations fail or the syllabus patterns cannot compile.
    pub fn with_extractor(
        mut repository: CourseRepository,
        documents: Box<dyn TextExtractor>,
    ) -> Result<Self> {
        repository.migrate()?;
        let syllabus = SyllabusExtractor::new().map_err(|err| anyhow!("{err}"))?;
        Ok(Self { repository, documents, syllabus })
    }

    /// Open the `SQLite` database at `db_path` and wrap it.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::new(CourseRepository::open(db_path)?)
    }

    #[must_use]
    pub fn repository(&self) -> &CourseRepository {
        &self.repository
    }

    /// Build a course from a syllabus document and persist it.
    ///
    /// Never fails outright: every problem is reported through
    /// [`ImportResult::error_message`] and logged.
    pub fn import_course(&mut self, path: &Path) -> ImportResult {
        match self.try_import(path) {
            Ok(course) => {
                tracing::info!(code = %course.code, path = %path.display(), "imported course");
                ImportResult::succeeded(course)
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(path = %path.display(), error = %message, "course import failed");
                ImportResult::failed(message)
            }
        }
    }

    fn try_import(&mut self, path: &Path) -> Result<Course> {
        let document = self.documents.extract_text(path)?;
        let extracted = self.syllabus.extract(&document.text);
        if extracted.code.is_none() || extracted.name.is_none() {
            return Err(anyhow!(MISSING_COURSE_INFO_MESSAGE));
        }

        let mut course = extracted
            .into_course(OffsetDateTime::now_utc())
            .map_err(|_| anyhow!(MISSING_COURSE_INFO_MESSAGE))?;
        course.syllabus_path = Some(path.display().to_string());
        course.source_hash = Some(document.sha256);
        course.validate()?;

        if self.repository.course_exists(&course.code)? {
            return Err(anyhow!("Course with code {} already exists", course.code));
        }
        self.repository.insert_course(&course)?;
        Ok(course)
    }

    /// Manually register a course that did not come from a document.
    ///
    /// # Errors
    /// Returns an error when the course is invalid, its code is taken, or the write fails.
    pub fn add_course(&mut self, course: &Course) -> Result<Course> {
        let mut course = course.clone();
        course.code = normalize_code(&course.code);
        course.validate()?;

        if self.repository.course_exists(&course.code)? {
            return Err(anyhow!("Course with code {} already exists", course.code));
        }
        self.repository.insert_course(&course)?;
        tracing::info!(code = %course.code, "added course");
        Ok(course)
    }

    /// Look up one course; the code is normalized first.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn get_course(&self, code: &str) -> Result<Option<Course>> {
        self.repository.get_course(&normalize_code(code))
    }

    /// Every course, ordered by code.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn get_all_courses(&self) -> Result<Vec<Course>> {
        self.repository.list_courses()
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn search_courses(&self, query: &str) -> Result<Vec<Course>> {
        self.repository.search_courses(query)
    }

    /// # Errors
    /// Returns an error when the store cannot be read.
    pub fn courses_for_term(&self, semester: Semester, year: i32) -> Result<Vec<Course>> {
        self.repository.list_courses_by_term(semester, year)
    }

    /// Persist every mutable field of `course`, stamping `updated_at`.
    ///
    /// Returns `false` when no course with that code exists.
    ///
    /// # Errors
    /// Returns an error when the course is invalid or the write fails.
    pub fn update_course(&mut self, course: &Course) -> Result<bool> {
        let mut course = course.clone();
        course.code = normalize_code(&course.code);
        course.touch(OffsetDateTime::now_utc().max(course.created_at));

        let updated = self.repository.update_course(&course)?;
        if updated {
            tracing::info!(code = %course.code, "updated course");
        } else {
            tracing::warn!(code = %course.code, "update skipped: course not found");
        }
        Ok(updated)
    }

    /// Remove a course by code. Returns `false` when it was not stored.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub fn delete_course(&mut self, code: &str) -> Result<bool> {
        let code = normalize_code(code);
        let deleted = self.repository.delete_course(&code)?;
        if deleted {
            tracing::info!(code = %code, "deleted course");
        } else {
            tracing::warn!(code = %code, "delete skipped: course not found");
        }
        Ok(deleted)
    }
}
