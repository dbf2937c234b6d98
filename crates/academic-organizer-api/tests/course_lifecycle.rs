use std::path::{Path, PathBuf};

use academic_organizer_api::CourseService;
use academic_organizer_core::{Semester, Term, Weekday};
use anyhow::{anyhow, Result};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn in_memory_service() -> Result<CourseService> {
    CourseService::open(Path::new(":memory:"))
}

#[test]
fn course_lifecycle_import_get_update_delete() -> Result<()> {
    let mut service = in_memory_service()?;

    let result = service.import_course(&fixture("sample_syllabus.txt"));
    assert!(result.success, "import failed: {:?}", result.error_message);
    assert!(result.error_message.is_none());
    let Some(imported) = result.course else {
        return Err(anyhow!("successful import MUST carry a course"));
    };
    assert_eq!(imported.code, "CS 101");

    let Some(mut stored) = service.get_course("CS 101")? else {
        return Err(anyhow!("imported course MUST be retrievable"));
    };
    assert_eq!(stored, imported);

    stored.name = "Updated Course Name".to_string();
    assert!(service.update_course(&stored)?);
    let Some(reloaded) = service.get_course("CS 101")? else {
        return Err(anyhow!("updated course MUST still exist"));
    };
    assert_eq!(reloaded.name, "Updated Course Name");
    assert!(reloaded.updated_at >= reloaded.created_at);

    assert!(service.delete_course("CS 101")?);
    assert!(service.get_course("CS 101")?.is_none());
    assert!(!service.delete_course("CS 101")?);
    Ok(())
}

#[test]
fn imported_course_carries_syllabus_details() -> Result<()> {
    let mut service = in_memory_service()?;
    let path = fixture("sample_syllabus.txt");

    let Some(course) = service.import_course(&path).course else {
        return Err(anyhow!("fixture syllabus MUST import"));
    };
    assert_eq!(course.name, "Introduction to Computer Science");
    assert_eq!(course.term, Some(Term { semester: Semester::Fall, year: 2024 }));
    assert_eq!(course.instructor.name, "Dr. Ada Lovelace");
    assert_eq!(course.instructor.email.as_deref(), Some("ada@example.edu"));
    assert_eq!(course.schedule.days, vec![Weekday::Monday, Weekday::Wednesday, Weekday::Friday]);
    assert_eq!(course.grading.iter().map(|component| component.weight).sum::<u32>(), 100);
    assert_eq!(course.syllabus_path.as_deref(), Some(path.display().to_string().as_str()));
    assert!(course.source_hash.as_deref().is_some_and(|hash| hash.starts_with("sha256:")));
    Ok(())
}

#[test]
fn reimporting_the_same_syllabus_fails() -> Result<()> {
    let mut service = in_memory_service()?;
    let path = fixture("sample_syllabus.txt");

    assert!(service.import_course(&path).success);
    let second = service.import_course(&path);
    assert!(!second.success);
    assert!(second.course.is_none());
    assert_eq!(second.error_message.as_deref(), Some("Course with code CS 101 already exists"));
    assert_eq!(service.get_all_courses()?.len(), 1);
    Ok(())
}

#[test]
fn markdown_syllabus_imports() -> Result<()> {
    let mut service = in_memory_service()?;

    let result = service.import_course(&fixture("sample_syllabus.md"));
    assert!(result.success, "import failed: {:?}", result.error_message);
    let Some(course) = service.get_course("math 2410")? else {
        return Err(anyhow!("markdown import MUST be stored"));
    };
    assert_eq!(course.name, "Linear Algebra");
    assert_eq!(course.schedule.days, vec![Weekday::Tuesday, Weekday::Thursday]);
    assert_eq!(service.courses_for_term(Semester::Spring, 2025)?.len(), 1);
    Ok(())
}

#[test]
fn missing_and_unsupported_files_fail_without_writing() -> Result<()> {
    let mut service = in_memory_service()?;
    let dir = tempfile::tempdir()?;

    let missing = service.import_course(&dir.path().join("nowhere.txt"));
    assert!(!missing.success);
    assert!(missing.error_message.as_deref().is_some_and(|m| m.starts_with("file not found")));

    let image = dir.path().join("syllabus.jpg");
    std::fs::write(&image, b"\xff\xd8\xff")?;
    let unsupported = service.import_course(&image);
    assert_eq!(unsupported.error_message.as_deref(), Some("unsupported file format: .jpg"));

    assert!(service.get_all_courses()?.is_empty());
    Ok(())
}
