use regex_lite::Regex;
use time::OffsetDateTime;

use crate::{
    normalize_code, ClockTime, Course, CourseError, GradeComponent, Instructor, Schedule,
    Semester, Term, Weekday, MAX_NAME_LEN, MAX_TERM_YEAR, MIN_TERM_YEAR,
};

const LABELLED_CODE_PATTERN: &str =
    r"(?im)^\s*(?:course|class)\s+(?:code|number)\s*:\s*([A-Za-z]{2,4}[ \t]*\d{3,4}[A-Za-z]?)\b";
const BARE_CODE_PATTERN: &str = r"\b([A-Z]{2,4}[ \t]?\d{3,4}[A-Z]?)\b";
const TITLE_PATTERN: &str = r"(?im)^\s*(?:course|class)\s+(?:title|name)\s*:\s*(.+?)\s*$";
const INSTRUCTOR_PATTERN: &str = r"(?im)^\s*(?:instructor|professor|teacher)\s*:\s*(.+?)\s*$";
const OFFICE_HOURS_PATTERN: &str = r"(?im)^\s*office\s+hours\s*:\s*(.+?)\s*$";
const OFFICE_LOCATION_PATTERN: &str = r"(?im)^\s*office(?:\s+location)?\s*:\s*(.+?)\s*$";
const CONTACT_PATTERN: &str = r"(?im)^\s*(?:phone|contact)\s*:\s*(.+?)\s*$";
const EMAIL_PATTERN: &str = r"[A-Za-z0-9_.+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const TERM_PATTERN: &str =
    r"(?im)^\s*(?:term|semester)\s*:\s*(fall|spring|summer|winter)[ \t,]*(\d{4})\b";
const TEXTBOOK_PATTERN: &str = r"(?im)^\s*(?:required\s+)?(?:texts?|textbooks?)\s*:\s*(.+?)\s*$";
const DESCRIPTION_PATTERN: &str = r"(?im)^\s*(?:course\s+)?description\s*:\s*(.+?)\s*$";
const LOCATION_PATTERN: &str = r"(?im)^\s*(?:location|room|classroom)\s*:\s*(.+?)\s*$";
const SCHEDULE_LINE_PATTERN: &str =
    r"(?im)^\s*(?:schedule|meets|meeting\s+times?|class\s+times?|days|lectures?)\s*:\s*(.+?)\s*$";
const TIME_PATTERN: &str = r"(\d{1,2}):(\d{2})\s*([AaPp][Mm])";
const GRADE_PERCENT_FIRST_PATTERN: &str = r"(\d{1,3})%\s*[-–:]\s*([A-Za-z][A-Za-z ]*)";
const GRADE_CATEGORY_FIRST_PATTERN: &str =
    r"(?m)^\s*([A-Za-z][A-Za-z ]*?)\s*[-–:]\s*(\d{1,3})\s*%";

/// Fields recovered from free syllabus text. Everything is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSyllabus {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub instructor: Instructor,
    pub schedule: Schedule,
    pub term: Option<Term>,
    pub textbooks: Vec<String>,
    pub grading: Vec<GradeComponent>,
}

impl ExtractedSyllabus {
    /// Turn the extraction into a new course record stamped with `now`.
    ///
    /// # Errors
    /// Returns [`CourseError::Extraction`] when the course code or name was not found.
    pub fn into_course(self, now: OffsetDateTime) -> Result<Course, CourseError> {
        let (Some(code), Some(name)) = (self.code, self.name) else {
            return Err(CourseError::Extraction(
                "failed to extract required course information: missing course code or name"
                    .to_string(),
            ));
        };

        let mut course = Course::new(&code, name, now);
        course.description = self.description;
        course.instructor = self.instructor;
        course.schedule = self.schedule;
        course.term = self.term;
        course.textbooks = self.textbooks;
        course.grading = self.grading;
        Ok(course)
    }
}

/// Compiled pattern set for pulling course details out of syllabus text.
#[derive(Debug, Clone)]
pub struct SyllabusExtractor {
    labelled_code: Regex,
    bare_code: Regex,
    title: Regex,
    instructor: Regex,
    office_hours: Regex,
    office_location: Regex,
    contact: Regex,
    email: Regex,
    term: Regex,
    textbook: Regex,
    description: Regex,
    location: Regex,
    schedule_line: Regex,
    time: Regex,
    grade_percent_first: Regex,
    grade_category_first: Regex,
}

impl SyllabusExtractor {
    /// Compile the extraction patterns.
    ///
    /// # Errors
    /// Returns [`CourseError::Extraction`] if a pattern fails to compile.
    pub fn new() -> Result<Self, CourseError> {
        Ok(Self {
            labelled_code: compile(LABELLED_CODE_PATTERN)?,
            bare_code: compile(BARE_CODE_PATTERN)?,
            title: compile(TITLE_PATTERN)?,
            instructor: compile(INSTRUCTOR_PATTERN)?,
            office_hours: compile(OFFICE_HOURS_PATTERN)?,
            office_location: compile(OFFICE_LOCATION_PATTERN)?,
            contact: compile(CONTACT_PATTERN)?,
            email: compile(EMAIL_PATTERN)?,
            term: compile(TERM_PATTERN)?,
            textbook: compile(TEXTBOOK_PATTERN)?,
            description: compile(DESCRIPTION_PATTERN)?,
            location: compile(LOCATION_PATTERN)?,
            schedule_line: compile(SCHEDULE_LINE_PATTERN)?,
            time: compile(TIME_PATTERN)?,
            grade_percent_first: compile(GRADE_PERCENT_FIRST_PATTERN)?,
            grade_category_first: compile(GRADE_CATEGORY_FIRST_PATTERN)?,
        })
    }

    #[must_use]
    pub fn extract(&self, text: &str) -> ExtractedSyllabus {
        let code = self.extract_code(text);
        let name = first_capture(&self.title, text)
            .or_else(|| code.as_deref().and_then(|code| self.name_after_code(text, code)))
            .map(|name| truncate_chars(&name, MAX_NAME_LEN));

        ExtractedSyllabus {
            code,
            name,
            description: first_capture(&self.description, text),
            instructor: self.extract_instructor(text),
            schedule: self.extract_schedule(text),
            term: self.extract_term(text),
            textbooks: self
                .textbook
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|value| value.as_str().trim().to_string())
                .filter(|value| !value.is_empty())
                .collect(),
            grading: self.extract_grading(text),
        }
    }

    fn extract_code(&self, text: &str) -> Option<String> {
        first_capture(&self.labelled_code, text)
            .or_else(|| first_capture(&self.bare_code, text))
            .map(|raw| normalize_code(&raw))
    }

    /// Rest of the line after the first occurrence of `code` that has something after it.
    fn name_after_code(&self, text: &str, code: &str) -> Option<String> {
        for found in self.bare_code.find_iter(text) {
            if normalize_code(found.as_str()) != code {
                continue;
            }
            let rest = text[found.end()..].lines().next().unwrap_or_default();
            let name = rest
                .trim_start()
                .trim_start_matches(['-', ':', '–'])
                .trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
        None
    }

    fn extract_instructor(&self, text: &str) -> Instructor {
        let mut instructor = Instructor::default();
        if let Some(name) = first_capture(&self.instructor, text) {
            let name = strip_contact_suffix(&name);
            if !name.is_empty() {
                instructor.name = name;
            }
        }
        instructor.email = self.email.find(text).map(|found| found.as_str().to_string());
        instructor.office_hours = first_capture(&self.office_hours, text);
        instructor.office_location = first_capture(&self.office_location, text);
        instructor.contact_info = first_capture(&self.contact, text);
        instructor
    }

    fn extract_term(&self, text: &str) -> Option<Term> {
        let caps = self.term.captures(text)?;
        let semester = Semester::parse(caps.get(1)?.as_str())?;
        let year = caps.get(2)?.as_str().parse::<i32>().ok()?;
        (MIN_TERM_YEAR..=MAX_TERM_YEAR).contains(&year).then_some(Term { semester, year })
    }

    fn extract_schedule(&self, text: &str) -> Schedule {
        let schedule_line = first_capture(&self.schedule_line, text);

        let mut days = match schedule_line.as_deref() {
            Some(line) => days_on_schedule_line(line),
            None => full_day_names(text),
        };
        days.sort_unstable();
        days.dedup();

        let times = schedule_line
            .as_deref()
            .map(|line| self.clock_times(line))
            .filter(|times| !times.is_empty())
            .unwrap_or_else(|| self.clock_times(text));
        let start_time = times.first().copied();
        let end_time = times.get(1).copied().filter(|end| start_time.is_some_and(|start| *end > start));

        Schedule { days, start_time, end_time, location: first_capture(&self.location, text) }
    }

    fn clock_times(&self, text: &str) -> Vec<ClockTime> {
        self.time
            .captures_iter(text)
            .filter_map(|caps| {
                let hour = caps.get(1)?.as_str().parse::<u8>().ok()?;
                let minute = caps.get(2)?.as_str().parse::<u8>().ok()?;
                let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");
                ClockTime::from_meridiem(hour, minute, pm).ok()
            })
            .take(2)
            .collect()
    }

    /// Weights are kept only when they form a complete 100% breakdown.
    fn extract_grading(&self, text: &str) -> Vec<GradeComponent> {
        let percent_first = self
            .grade_percent_first
            .captures_iter(text)
            .filter_map(|caps| grade_component(caps.get(2)?.as_str(), caps.get(1)?.as_str()))
            .collect::<Vec<_>>();
        let grading = if percent_first.is_empty() {
            self.grade_category_first
                .captures_iter(text)
                .filter_map(|caps| grade_component(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
                .collect::<Vec<_>>()
        } else {
            percent_first
        };

        let total: u32 = grading.iter().map(|component| component.weight).sum();
        if total == 100 {
            grading
        } else {
            Vec::new()
        }
    }
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn compile(pattern: &str) -> Result<Regex, CourseError> {
    Regex::new(pattern)
        .map_err(|err| CourseError::Extraction(format!("invalid extraction pattern: {err}")))
}

fn grade_component(category: &str, weight: &str) -> Option<GradeComponent> {
    let category = category.trim();
    let weight = weight.parse::<u32>().ok()?;
    (!category.is_empty() && weight <= 100)
        .then(|| GradeComponent { category: category.to_string(), weight })
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Drop a trailing `(email)` / `, email` / `<email>` from an instructor line.
fn strip_contact_suffix(value: &str) -> String {
    match value.find(['(', ',', '<']) {
        Some(index) if value[index..].contains('@') => value[..index].trim().to_string(),
        _ => value.trim().to_string(),
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|ch: char| !ch.is_ascii_alphabetic()).filter(|word| !word.is_empty())
}

fn day_word(word: &str) -> Option<Weekday> {
    Weekday::from_word(word)
        .or_else(|| word.strip_suffix(['s', 'S']).and_then(Weekday::from_word))
}

fn days_on_schedule_line(line: &str) -> Vec<Weekday> {
    let mut days = Vec::new();
    for word in words(line) {
        if let Some(day) = day_word(word) {
            days.push(day);
        } else if let Some(run) = compact_day_run(word) {
            days.extend(run);
        }
    }
    days
}

fn full_day_names(text: &str) -> Vec<Weekday> {
    words(text)
        .filter_map(|word| {
            let word = word.strip_suffix(['s', 'S']).unwrap_or(word);
            Weekday::ALL.into_iter().find(|day| day.as_str().eq_ignore_ascii_case(word))
        })
        .collect()
}

/// Decode runs like `MWF`, `TTh` or `TuTh`. The whole word must decode.
fn compact_day_run(word: &str) -> Option<Vec<Weekday>> {
    const CODES: [(&str, Weekday); 9] = [
        ("Th", Weekday::Thursday),
        ("Tu", Weekday::Tuesday),
        ("Sa", Weekday::Saturday),
        ("Su", Weekday::Sunday),
        ("M", Weekday::Monday),
        ("T", Weekday::Tuesday),
        ("W", Weekday::Wednesday),
        ("R", Weekday::Thursday),
        ("F", Weekday::Friday),
    ];

    let mut rest = word;
    let mut days = Vec::new();
    while !rest.is_empty() {
        let (prefix, day) = CODES.iter().find(|(prefix, _)| rest.starts_with(prefix))?;
        days.push(*day);
        rest = &rest[prefix.len()..];
    }
    Some(days)
}
