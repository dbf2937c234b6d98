use std::fs;
use std::path::{Path, PathBuf};

use academic_organizer_api::{AppConfig, CourseService};
use academic_organizer_core::{
    normalize_code, ClockTime, Course, GradeComponent, Instructor, Semester, Term, Weekday,
};
use academic_organizer_store_sqlite::CourseRepository;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use time::OffsetDateTime;

mod logging;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "academic-organizer")]
#[command(about = "Academic Organizer course manager CLI")]
struct Cli {
    /// Database file; defaults to `data_dir/database.name` from the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Course {
        #[command(subcommand)]
        command: Box<CourseCommand>,
    },
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum CourseCommand {
    Import(CourseImportArgs),
    Add(CourseAddArgs),
    Show(CourseCodeArgs),
    List(CourseListArgs),
    Search(CourseSearchArgs),
    Update(CourseUpdateArgs),
    Delete(CourseCodeArgs),
}

#[derive(Debug, Args)]
struct CourseImportArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Args)]
struct CourseCodeArgs {
    #[arg(long)]
    code: String,
}

#[derive(Debug, Args)]
struct CourseAddArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    instructor: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, value_enum, requires = "year")]
    semester: Option<SemesterArg>,
    #[arg(long, requires = "semester")]
    year: Option<i32>,
    #[arg(long = "day", value_parser = parse_weekday)]
    days: Vec<Weekday>,
    #[arg(long)]
    start: Option<ClockTime>,
    #[arg(long)]
    end: Option<ClockTime>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long = "textbook")]
    textbooks: Vec<String>,
    /// Grading component as `CATEGORY=WEIGHT`; weights must total 100.
    #[arg(long = "grade", value_parser = parse_grade)]
    grading: Vec<GradeComponent>,
}

#[derive(Debug, Args)]
struct CourseListArgs {
    #[arg(long, value_enum, requires = "year")]
    semester: Option<SemesterArg>,
    #[arg(long, requires = "semester")]
    year: Option<i32>,
}

#[derive(Debug, Args)]
struct CourseSearchArgs {
    #[arg(long)]
    query: String,
}

#[derive(Debug, Args)]
struct CourseUpdateArgs {
    #[arg(long)]
    code: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    instructor: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    office_hours: Option<String>,
    #[arg(long)]
    office_location: Option<String>,
    #[arg(long)]
    location: Option<String>,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Export(DbExportArgs),
    Import(DbImportArgs),
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbImportArgs {
    #[arg(long = "in")]
    input: PathBuf,
    #[arg(long, default_value_t = false)]
    skip_existing: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SemesterArg {
    Fall,
    Spring,
    Summer,
    Winter,
}

impl From<SemesterArg> for Semester {
    fn from(value: SemesterArg) -> Self {
        match value {
            SemesterArg::Fall => Self::Fall,
            SemesterArg::Spring => Self::Spring,
            SemesterArg::Summer => Self::Summer,
            SemesterArg::Winter => Self::Winter,
        }
    }
}

fn parse_weekday(raw: &str) -> Result<Weekday, String> {
    Weekday::from_word(raw.trim()).ok_or_else(|| format!("unknown weekday: {raw}"))
}

fn parse_grade(raw: &str) -> Result<GradeComponent, String> {
    let (category, weight) =
        raw.rsplit_once('=').ok_or_else(|| format!("grade MUST be CATEGORY=WEIGHT: {raw}"))?;
    let weight = weight
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("grade weight MUST be a whole number: {raw}"))?;
    Ok(GradeComponent { category: category.trim().to_string(), weight })
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_source) = AppConfig::load(cli.config.as_deref())?;
    logging::init_cli_logger(cli.verbose, &config.logging.level);
    match config_source.as_deref() {
        Some(path) => tracing::debug!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file found; using defaults"),
    }

    let db_path = resolve_db_path(cli.db.as_deref(), &config)?;
    tracing::debug!(db = %db_path.display(), "using database");

    match cli.command {
        Command::Course { command } => {
            if !config.course_manager_enabled() {
                return Err(anyhow!(
                    "course manager module is disabled in configuration (modules.course_manager.enabled)"
                ));
            }
            let mut service = CourseService::open(&db_path)?;
            run_course(*command, &mut service)
        }
        Command::Db { command } => {
            let mut repository = CourseRepository::open(&db_path)?;
            run_db(*command, &mut repository)
        }
    }
}

fn resolve_db_path(explicit: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let path = config.database_path();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {}", parent.display()))?;
    }
    Ok(path)
}

fn run_course(command: CourseCommand, service: &mut CourseService) -> Result<()> {
    match command {
        CourseCommand::Import(args) => run_course_import(&args, service),
        CourseCommand::Add(args) => run_course_add(args, service),
        CourseCommand::Show(args) => run_course_show(&args, service),
        CourseCommand::List(args) => run_course_list(&args, service),
        CourseCommand::Search(args) => run_course_search(&args, service),
        CourseCommand::Update(args) => run_course_update(args, service),
        CourseCommand::Delete(args) => run_course_delete(&args, service),
    }
}

fn run_course_import(args: &CourseImportArgs, service: &mut CourseService) -> Result<()> {
    let result = service.import_course(&args.file);
    if !result.success {
        let message = result.error_message.unwrap_or_else(|| "unknown import failure".to_string());
        return Err(anyhow!("course import failed: {message}"));
    }
    emit_json(serde_json::to_value(&result).context("failed to serialize import result")?)
}

fn run_course_add(args: CourseAddArgs, service: &mut CourseService) -> Result<()> {
    let mut course = Course::new(&args.code, args.name, OffsetDateTime::now_utc());
    course.description = args.description;
    if let Some(name) = args.instructor {
        course.instructor = Instructor::named(name);
    }
    course.instructor.email = args.email;
    course.term = match (args.semester, args.year) {
        (Some(semester), Some(year)) => Some(Term { semester: semester.into(), year }),
        _ => None,
    };
    course.schedule.days = args.days;
    course.schedule.normalize_days();
    course.schedule.start_time = args.start;
    course.schedule.end_time = args.end;
    course.schedule.location = args.location;
    course.textbooks = args.textbooks;
    course.grading = args.grading;

    let added = service.add_course(&course)?;
    emit_json(serde_json::to_value(&added).context("failed to serialize course")?)
}

fn run_course_show(args: &CourseCodeArgs, service: &CourseService) -> Result<()> {
    let Some(course) = service.get_course(&args.code)? else {
        return Err(anyhow!("course not found: {}", args.code));
    };
    emit_json(serde_json::to_value(&course).context("failed to serialize course")?)
}

fn run_course_list(args: &CourseListArgs, service: &CourseService) -> Result<()> {
    let courses = match (args.semester, args.year) {
        (Some(semester), Some(year)) => service.courses_for_term(semester.into(), year)?,
        _ => service.get_all_courses()?,
    };
    emit_json(serde_json::json!({
        "count": courses.len(),
        "courses": courses
    }))
}

fn run_course_search(args: &CourseSearchArgs, service: &CourseService) -> Result<()> {
    let courses = service.search_courses(&args.query)?;
    emit_json(serde_json::json!({
        "query": args.query,
        "count": courses.len(),
        "courses": courses
    }))
}

fn run_course_update(args: CourseUpdateArgs, service: &mut CourseService) -> Result<()> {
    let Some(mut course) = service.get_course(&args.code)? else {
        return Err(anyhow!("course not found: {}", args.code));
    };

    if let Some(name) = args.name {
        course.name = name;
    }
    if let Some(description) = args.description {
        course.description = Some(description);
    }
    if let Some(instructor) = args.instructor {
        course.instructor.name = instructor;
    }
    if let Some(email) = args.email {
        course.instructor.email = Some(email);
    }
    if let Some(office_hours) = args.office_hours {
        course.instructor.office_hours = Some(office_hours);
    }
    if let Some(office_location) = args.office_location {
        course.instructor.office_location = Some(office_location);
    }
    if let Some(location) = args.location {
        course.schedule.location = Some(location);
    }

    let updated = service.update_course(&course)?;
    let stored = service.get_course(&course.code)?;
    emit_json(serde_json::json!({
        "updated": updated,
        "course": stored
    }))
}

fn run_course_delete(args: &CourseCodeArgs, service: &mut CourseService) -> Result<()> {
    let deleted = service.delete_course(&args.code)?;
    emit_json(serde_json::json!({
        "code": normalize_code(&args.code),
        "deleted": deleted
    }))
}

fn run_db(command: DbCommand, repository: &mut CourseRepository) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(repository),
        DbCommand::Migrate(args) => run_db_migrate(&args, repository),
        DbCommand::Export(args) => run_db_export(&args, repository),
        DbCommand::Import(args) => run_db_import(&args, repository),
        DbCommand::Backup(args) => run_db_backup(&args, repository),
        DbCommand::Restore(args) => run_db_restore(&args, repository),
        DbCommand::IntegrityCheck => run_db_integrity_check(repository),
    }
}

fn run_db_schema_version(repository: &CourseRepository) -> Result<()> {
    let status = repository.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty(),
        "inferred_from_legacy": status.inferred_from_legacy
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, repository: &mut CourseRepository) -> Result<()> {
    let before = repository.schema_status()?;
    if args.dry_run {
        return emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions,
            "inferred_from_legacy": before.inferred_from_legacy
        }));
    }

    repository.migrate()?;
    let after = repository.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_db_export(args: &DbExportArgs, repository: &mut CourseRepository) -> Result<()> {
    repository.migrate()?;
    let manifest = repository.export_snapshot(&args.out)?;
    emit_json(serde_json::json!({
        "out_dir": args.out,
        "manifest": manifest
    }))
}

fn run_db_import(args: &DbImportArgs, repository: &mut CourseRepository) -> Result<()> {
    repository.migrate()?;
    let summary = repository.import_snapshot(&args.input, args.skip_existing)?;
    emit_json(serde_json::json!({
        "in_dir": args.input,
        "skip_existing": args.skip_existing,
        "summary": summary
    }))
}

fn run_db_backup(args: &DbBackupArgs, repository: &mut CourseRepository) -> Result<()> {
    repository.migrate()?;
    repository.backup_database(&args.out)?;
    emit_json(serde_json::json!({
        "backup_path": args.out,
        "status": "ok"
    }))
}

fn run_db_restore(args: &DbRestoreArgs, repository: &mut CourseRepository) -> Result<()> {
    repository.restore_database(&args.input)?;
    let status = repository.schema_status()?;
    emit_json(serde_json::json!({
        "restored_from": args.input,
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions
    }))
}

fn run_db_integrity_check(repository: &CourseRepository) -> Result<()> {
    let report = repository.integrity_check()?;
    emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
}
