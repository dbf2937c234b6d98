use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub mod extract;

pub use extract::{ExtractedSyllabus, SyllabusExtractor};

pub const MAX_CODE_LEN: usize = 20;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_TERM_YEAR: i32 = 1900;
pub const MAX_TERM_YEAR: i32 = 9999;
pub const UNKNOWN_INSTRUCTOR: &str = "Unknown";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CourseError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("extraction error: {0}")]
    Extraction(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Monday" => Some(Self::Monday),
            "Tuesday" => Some(Self::Tuesday),
            "Wednesday" => Some(Self::Wednesday),
            "Thursday" => Some(Self::Thursday),
            "Friday" => Some(Self::Friday),
            "Saturday" => Some(Self::Saturday),
            "Sunday" => Some(Self::Sunday),
            _ => None,
        }
    }

    /// Match a full day name or a common three/four letter abbreviation, ignoring case.
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "monday" | "mon" => Some(Self::Monday),
            "tuesday" | "tue" | "tues" => Some(Self::Tuesday),
            "wednesday" | "wed" => Some(Self::Wednesday),
            "thursday" | "thu" | "thur" | "thurs" => Some(Self::Thursday),
            "friday" | "fri" => Some(Self::Friday),
            "saturday" | "sat" => Some(Self::Saturday),
            "sunday" | "sun" => Some(Self::Sunday),
            _ => None,
        }
    }
}

impl Display for Weekday {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Semester {
    Fall,
    Spring,
    Summer,
    Winter,
}

impl Semester {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fall => "Fall",
            Self::Spring => "Spring",
            Self::Summer => "Summer",
            Self::Winter => "Winter",
        }
    }

    /// Parse a semester name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fall" => Some(Self::Fall),
            "spring" => Some(Self::Spring),
            "summer" => Some(Self::Summer),
            "winter" => Some(Self::Winter),
            _ => None,
        }
    }
}

impl Display for Semester {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Term {
    pub semester: Semester,
    pub year: i32,
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.semester, self.year)
    }
}

/// Wall-clock time of day with minute precision, serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Build a 24-hour clock time.
    ///
    /// # Errors
    /// Returns [`CourseError::Validation`] when hour or minute is out of range.
    pub fn new(hour: u8, minute: u8) -> Result<Self, CourseError> {
        if hour > 23 || minute > 59 {
            return Err(CourseError::Validation(format!(
                "clock time {hour:02}:{minute:02} is out of range"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Convert a 12-hour reading (`1..=12` plus AM/PM) into 24-hour form.
    ///
    /// # Errors
    /// Returns [`CourseError::Validation`] when the 12-hour reading is out of range.
    pub fn from_meridiem(hour: u8, minute: u8, pm: bool) -> Result<Self, CourseError> {
        if !(1..=12).contains(&hour) {
            return Err(CourseError::Validation(format!(
                "12-hour clock reading {hour}:{minute:02} is out of range"
            )));
        }
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (hour, true) => hour + 12,
            (hour, false) => hour,
        };
        Self::new(hour, minute)
    }

    #[must_use]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = CourseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || CourseError::Validation(format!("clock time MUST be HH:MM: {value}"));
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = CourseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Instructor {
    pub name: String,
    pub email: Option<String>,
    pub office_hours: Option<String>,
    pub office_location: Option<String>,
    pub contact_info: Option<String>,
}

impl Instructor {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            office_hours: None,
            office_location: None,
            contact_info: None,
        }
    }
}

impl Default for Instructor {
    fn default() -> Self {
        Self::named(UNKNOWN_INSTRUCTOR)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Schedule {
    #[serde(default)]
    pub days: Vec<Weekday>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub location: Option<String>,
}

impl Schedule {
    /// Sort meeting days Monday-first and drop duplicates.
    pub fn normalize_days(&mut self) {
        self.days.sort_unstable();
        self.days.dedup();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GradeComponent {
    pub category: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Course {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub instructor: Instructor,
    #[serde(default)]
    pub schedule: Schedule,
    pub term: Option<Term>,
    pub syllabus_path: Option<String>,
    pub source_hash: Option<String>,
    #[serde(default)]
    pub textbooks: Vec<String>,
    #[serde(default)]
    pub grading: Vec<GradeComponent>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Course {
    /// Start a course record with a normalized code and no optional details.
    #[must_use]
    pub fn new(code: &str, name: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            code: normalize_code(code),
            name: name.into(),
            description: None,
            instructor: Instructor::default(),
            schedule: Schedule::default(),
            term: None,
            syllabus_path: None,
            source_hash: None,
            textbooks: Vec::new(),
            grading: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
    }

    /// Validate one course record before it is persisted.
    ///
    /// # Errors
    /// Returns [`CourseError::Validation`] when the code, name, instructor, term,
    /// schedule, provenance hash, textbooks, or grading breakdown are malformed.
    pub fn validate(&self) -> Result<(), CourseError> {
        validate_code(&self.code)?;

        if self.name.trim().is_empty() {
            return Err(CourseError::Validation("course name MUST be provided".to_string()));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(CourseError::Validation(format!(
                "course name MUST be at most {MAX_NAME_LEN} characters"
            )));
        }

        if self.instructor.name.trim().is_empty() {
            return Err(CourseError::Validation("instructor name MUST be provided".to_string()));
        }
        if let Some(email) = &self.instructor.email {
            if !is_plausible_email(email) {
                return Err(CourseError::Validation(format!(
                    "instructor email is malformed: {email}"
                )));
            }
        }

        if let Some(term) = self.term {
            if !(MIN_TERM_YEAR..=MAX_TERM_YEAR).contains(&term.year) {
                return Err(CourseError::Validation(format!(
                    "term year MUST be in [{MIN_TERM_YEAR}, {MAX_TERM_YEAR}] (got {})",
                    term.year
                )));
            }
        }

        if let (Some(start), Some(end)) = (self.schedule.start_time, self.schedule.end_time) {
            if end <= start {
                return Err(CourseError::Validation(format!(
                    "schedule end_time {end} MUST be later than start_time {start}"
                )));
            }
        }

        if let Some(source_hash) = &self.source_hash {
            if !source_hash.starts_with("sha256:") || source_hash.len() <= 7 {
                return Err(CourseError::Validation(
                    "source_hash MUST be formatted as sha256:<hex>".to_string(),
                ));
            }
        }

        if self.textbooks.iter().any(|title| title.trim().is_empty()) {
            return Err(CourseError::Validation("textbook titles MUST be non-empty".to_string()));
        }

        validate_grading(&self.grading)?;

        if self.updated_at < self.created_at {
            return Err(CourseError::Validation(
                "updated_at MUST NOT precede created_at".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ImportResult {
    pub success: bool,
    pub course: Option<Course>,
    pub error_message: Option<String>,
}

impl ImportResult {
    #[must_use]
    pub fn succeeded(course: Course) -> Self {
        Self { success: true, course: Some(course), error_message: None }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, course: None, error_message: Some(message.into()) }
    }
}

/// Canonical key form of a course code: trimmed, upper-cased, single inner
/// spaces, and exactly one space between the letter prefix and the number
/// (`cs101` and `CS  101` both become `CS 101`).
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    match code_parts(&collapsed) {
        Some((prefix, number)) => format!("{prefix} {number}"),
        None => collapsed,
    }
}

/// Check that a normalized course code is usable as a key.
///
/// # Errors
/// Returns [`CourseError::Validation`] when the code is empty, too long, or not
/// in the canonical `CS 101` / `MATH 2410A` form.
pub fn validate_code(code: &str) -> Result<(), CourseError> {
    if code.trim().is_empty() {
        return Err(CourseError::Validation("course code MUST be provided".to_string()));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(CourseError::Validation(format!(
            "course code MUST be at most {MAX_CODE_LEN} characters"
        )));
    }
    if !is_well_formed_code(code) {
        return Err(CourseError::Validation(format!(
            "course code `{code}` MUST be 2-4 letters, a space, 3-4 digits and an optional suffix letter"
        )));
    }
    Ok(())
}

fn is_well_formed_code(code: &str) -> bool {
    code_parts(code).is_some_and(|(prefix, number)| code == format!("{prefix} {number}"))
}

/// Split a code shaped like `CS101` or `CS 101A` into its letter prefix and number part.
fn code_parts(code: &str) -> Option<(&str, &str)> {
    let letters = code.bytes().take_while(u8::is_ascii_uppercase).count();
    if !(2..=4).contains(&letters) {
        return None;
    }

    let (prefix, rest) = code.split_at(letters);
    let number = rest.strip_prefix(' ').unwrap_or(rest);
    let digits = number.bytes().take_while(u8::is_ascii_digit).count();
    if !(3..=4).contains(&digits) {
        return None;
    }

    let well_formed = match &number.as_bytes()[digits..] {
        [] => true,
        [suffix] => suffix.is_ascii_uppercase(),
        _ => false,
    };
    well_formed.then_some((prefix, number))
}

fn is_plausible_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

fn validate_grading(grading: &[GradeComponent]) -> Result<(), CourseError> {
    if grading.is_empty() {
        return Ok(());
    }

    for component in grading {
        if component.category.trim().is_empty() {
            return Err(CourseError::Validation(
                "grading category MUST be non-empty".to_string(),
            ));
        }
        if component.weight > 100 {
            return Err(CourseError::Validation(format!(
                "grading weight for {} MUST be at most 100 (got {})",
                component.category, component.weight
            )));
        }
    }

    let total: u32 = grading.iter().map(|component| component.weight).sum();
    if total != 100 {
        return Err(CourseError::Validation(format!(
            "grading weights MUST sum to 100 (got {total})"
        )));
    }

    Ok(())
}
