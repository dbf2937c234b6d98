use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const SYLLABUS: &str = "\
CS 101 - Introduction to Computer Science
Term: Fall 2024
Instructor: Dr. Ada Lovelace (ada@example.edu)
Schedule: MWF 10:00 AM - 10:50 AM
Location: Science Building 120

Grading:
40% - Homework
25% - Midterm Exam
35% - Final Exam
";

/// Temp workspace with its own database and an explicit config file.
struct Workspace {
    dir: TempDir,
    db: PathBuf,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        Self::with_config("logging:\n  level: warn\n")
    }

    fn with_config(body: &str) -> Self {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
        let db = dir.path().join("organizer.sqlite3");
        let config = dir.path().join("config.yaml");
        fs::write(&config, body)
            .unwrap_or_else(|err| panic!("failed to write config {}: {err}", config.display()));
        Self { dir, db, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, body)
            .unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
        path
    }

    fn run<I, S>(&self, args: I) -> Output
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(env!("CARGO_BIN_EXE_academic-organizer"))
            .arg("--db")
            .arg(&self.db)
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .unwrap_or_else(|err| panic!("failed to execute academic-organizer binary: {err}"))
    }

    fn run_json<I, S>(&self, args: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(args);
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!(
                "academic-organizer command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
                output.status, stdout, stderr
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let value: Value = serde_json::from_str(&stdout)
            .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"));
        assert_eq!(as_str(&value, "contract_version"), "cli.v1");
        value
    }

    fn run_failure<I, S>(&self, args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(args);
        assert!(!output.status.success(), "command unexpectedly succeeded");
        assert!(output.stdout.is_empty(), "failed commands MUST NOT print JSON");
        String::from_utf8_lossy(&output.stderr).to_string()
    }
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_bool(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or_else(|| panic!("missing bool field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

#[test]
fn course_lifecycle_through_the_cli() {
    let ws = Workspace::new();
    let syllabus = ws.write("syllabus.txt", SYLLABUS);

    let imported = ws.run_json(["course", "import", "--file", path_str(&syllabus)]);
    assert!(as_bool(&imported, "success"));
    assert_eq!(as_str(&imported["course"], "code"), "CS 101");

    let shown = ws.run_json(["course", "show", "--code", "cs101"]);
    assert_eq!(as_str(&shown, "name"), "Introduction to Computer Science");
    assert_eq!(as_str(&shown["instructor"], "name"), "Dr. Ada Lovelace");

    let updated =
        ws.run_json(["course", "update", "--code", "CS 101", "--name", "Updated Course Name"]);
    assert!(as_bool(&updated, "updated"));
    assert_eq!(as_str(&updated["course"], "name"), "Updated Course Name");

    let deleted = ws.run_json(["course", "delete", "--code", "CS 101"]);
    assert!(as_bool(&deleted, "deleted"));
    assert_eq!(as_str(&deleted, "code"), "CS 101");

    let stderr = ws.run_failure(["course", "show", "--code", "CS 101"]);
    assert!(stderr.contains("course not found: CS 101"), "stderr: {stderr}");

    let deleted_again = ws.run_json(["course", "delete", "--code", "CS 101"]);
    assert!(!as_bool(&deleted_again, "deleted"));
}

#[test]
fn duplicate_import_fails_with_clear_message() {
    let ws = Workspace::new();
    let syllabus = ws.write("syllabus.txt", SYLLABUS);

    ws.run_json(["course", "import", "--file", path_str(&syllabus)]);
    let stderr = ws.run_failure(["course", "import", "--file", path_str(&syllabus)]);
    assert!(stderr.contains("Course with code CS 101 already exists"), "stderr: {stderr}");

    let listed = ws.run_json(["course", "list"]);
    assert_eq!(as_i64(&listed, "count"), 1);
}

#[test]
fn unsupported_documents_are_rejected() {
    let ws = Workspace::new();
    let image = ws.write("syllabus.png", "not really an image");

    let stderr = ws.run_failure(["course", "import", "--file", path_str(&image)]);
    assert!(stderr.contains("unsupported file format: .png"), "stderr: {stderr}");
}

#[test]
fn manual_add_list_by_term_and_search() {
    let ws = Workspace::new();

    let added = ws.run_json([
        "course", "add", "--code", "math 2410", "--name", "Linear Algebra",
        "--instructor", "Dr. Emmy Noether", "--semester", "spring", "--year", "2025",
        "--day", "tue", "--day", "thu", "--start", "09:30", "--end", "10:45",
        "--grade", "Problem Sets=50", "--grade", "Final Exam=50",
    ]);
    assert_eq!(as_str(&added, "code"), "MATH 2410");
    assert_eq!(added["schedule"]["days"], serde_json::json!(["Tuesday", "Thursday"]));
    assert_eq!(as_str(&added["schedule"], "start_time"), "09:30");

    ws.run_json(["course", "add", "--code", "HIST 120", "--name", "World History"]);

    let spring = ws.run_json(["course", "list", "--semester", "spring", "--year", "2025"]);
    assert_eq!(as_i64(&spring, "count"), 1);
    assert_eq!(as_str(&spring["courses"][0], "code"), "MATH 2410");

    let everything = ws.run_json(["course", "list"]);
    assert_eq!(as_i64(&everything, "count"), 2);

    let found = ws.run_json(["course", "search", "--query", "history"]);
    assert_eq!(as_i64(&found, "count"), 1);
    assert_eq!(as_str(&found["courses"][0], "code"), "HIST 120");

    let stderr = ws.run_failure([
        "course", "add", "--code", "BAD 100", "--name", "Bad Grades",
        "--grade", "Homework=60",
    ]);
    assert!(stderr.contains("validation error"), "stderr: {stderr}");
}

#[test]
fn disabled_course_manager_blocks_course_commands() {
    let ws = Workspace::with_config("modules:\n  course_manager:\n    enabled: false\n");

    let stderr = ws.run_failure(["course", "list"]);
    assert!(stderr.contains("course manager module is disabled"), "stderr: {stderr}");

    let status = ws.run_json(["db", "schema-version"]);
    assert_eq!(as_i64(&status, "target_version"), 2);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let ws = Workspace::new();
    fs::remove_file(&ws.config)
        .unwrap_or_else(|err| panic!("failed to remove config: {err}"));

    let stderr = ws.run_failure(["course", "list"]);
    assert!(stderr.contains("config file does not exist"), "stderr: {stderr}");
}

#[test]
fn db_schema_migrate_and_integrity_commands() {
    let ws = Workspace::new();

    let status = ws.run_json(["db", "schema-version"]);
    assert_eq!(as_i64(&status, "current_version"), 0);
    assert_eq!(status["pending_versions"], serde_json::json!([1, 2]));
    assert!(!as_bool(&status, "up_to_date"));

    let dry_run = ws.run_json(["db", "migrate", "--dry-run"]);
    assert!(as_bool(&dry_run, "dry_run"));
    assert_eq!(dry_run["would_apply_versions"], serde_json::json!([1, 2]));

    let migrated = ws.run_json(["db", "migrate"]);
    assert!(as_bool(&migrated, "up_to_date"));
    assert_eq!(migrated["applied_versions"], serde_json::json!([1, 2]));

    let status = ws.run_json(["db", "schema-version"]);
    assert_eq!(as_i64(&status, "current_version"), as_i64(&status, "target_version"));

    let report = ws.run_json(["db", "integrity-check"]);
    assert!(as_bool(&report, "quick_check_ok"));
    assert_eq!(report["foreign_key_violations"], serde_json::json!([]));
}

#[test]
fn export_import_and_backup_restore_round_trip() {
    let source = Workspace::new();
    let syllabus = source.write("syllabus.txt", SYLLABUS);
    source.run_json(["course", "import", "--file", path_str(&syllabus)]);

    let snapshot = source.path("snapshot");
    let exported = source.run_json(["db", "export", "--out", path_str(&snapshot)]);
    assert_eq!(exported["manifest"]["files"][0]["records"], serde_json::json!(1));

    let target = Workspace::new();
    let imported = target.run_json(["db", "import", "--in", path_str(&snapshot)]);
    assert_eq!(as_i64(&imported["summary"], "imported_courses"), 1);

    let stderr = target.run_failure(["db", "import", "--in", path_str(&snapshot)]);
    assert!(stderr.contains("course already exists: CS 101"), "stderr: {stderr}");

    let skipped =
        target.run_json(["db", "import", "--in", path_str(&snapshot), "--skip-existing"]);
    assert_eq!(as_i64(&skipped["summary"], "skipped_existing_courses"), 1);

    let backup = source.path("backups/organizer.bak");
    let backed_up = source.run_json(["db", "backup", "--out", path_str(&backup)]);
    assert_eq!(as_str(&backed_up, "status"), "ok");

    source.run_json(["course", "delete", "--code", "CS 101"]);
    source.run_json(["db", "restore", "--in", path_str(&backup)]);
    let shown = source.run_json(["course", "show", "--code", "CS 101"]);
    assert_eq!(as_str(&shown, "code"), "CS 101");
}
