//! sheetdrive - files and a task plan kept in a spreadsheet
//!
//! This tool provides commands for:
//! - Initializing, repairing and migrating the file store tab
//! - Listing, reading, writing and deleting stored files
//! - Reading and writing arbitrary ranges
//! - Creating a plan and moving its tasks through their states
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/sheetdrive/config.toml (~/.config/sheetdrive/config.toml)
//! - Logs: $XDG_STATE_HOME/sheetdrive/ (~/.local/state/sheetdrive/)

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use sheetdrive_core::auth::CredentialSources;
use sheetdrive_core::codec::{A1Range, CellValue, Condition, MatchMode, Record, WriteData};
use sheetdrive_core::executor::ServiceAccountConnector;
use sheetdrive_core::plan::{PlanDraft, Task};
use sheetdrive_core::{
    Config, FileStatus, FileStore, FileWrite, Plan, PlanTracker, RequestExecutor,
};

#[derive(Parser)]
#[command(name = "sheetdrive")]
#[command(about = "Files and a task plan kept in a spreadsheet")]
#[command(version)]
struct Args {
    /// Spreadsheet id (default: sheets.spreadsheet_id from config)
    #[arg(long, global = true)]
    spreadsheet: Option<String>,

    /// Service-account credential file
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Echo retries, repairs and migrations to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the store layout, repairing or migrating it if needed
    Init {
        /// Rewrite the layout even if it is already valid
        #[arg(long)]
        force: bool,
    },

    /// List stored files
    Ls {
        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a file's content
    Cat {
        name: String,

        /// Print the file with its metadata as JSON
        #[arg(long)]
        meta: bool,
    },

    /// Create or overwrite a file
    Write(WriteArgs),

    /// Delete a file
    Rm { name: String },

    /// Report files whose dependency names no existing file
    Deps,

    /// Read and write arbitrary ranges
    #[command(subcommand)]
    Range(RangeCommand),

    /// Plan and task tracking
    #[command(subcommand)]
    Plan(PlanCommand),
}

#[derive(clap::Args)]
struct WriteArgs {
    name: String,

    /// Content text (default: read from stdin)
    #[arg(long, conflicts_with = "file")]
    content: Option<String>,

    /// Read content from this file
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long = "desc")]
    description: Option<String>,

    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,

    /// active, archived or deprecated
    #[arg(long)]
    status: Option<FileStatus>,

    /// Logical path (default: /NAME)
    #[arg(long)]
    path: Option<String>,

    /// Name of a file this one depends on ("" clears it)
    #[arg(long)]
    depends_on: Option<String>,

    /// Reject content longer than this many UTF-16 units
    #[arg(long)]
    max_length: Option<usize>,

    /// Fail if the file already exists
    #[arg(long)]
    create: bool,
}

#[derive(Subcommand)]
enum RangeCommand {
    /// Print a range as JSON rows
    Get {
        range: String,

        /// Treat the first row as headers and print objects
        #[arg(long)]
        records: bool,
    },

    /// Overwrite cells starting at the range's top-left corner
    Set {
        range: String,

        /// JSON array of rows, or of objects (written with a header row)
        #[arg(long)]
        json: String,
    },

    /// Append rows after the last row of the range's table
    Append {
        range: String,

        #[arg(long)]
        json: String,
    },

    /// Clear values in a range
    Clear { range: String },

    /// Print records whose columns match every COLUMN=VALUE condition
    Find {
        range: String,

        #[arg(long = "where", value_name = "COLUMN=VALUE", required = true)]
        conditions: Vec<String>,

        /// Case-insensitive substring matching
        #[arg(long)]
        loose: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Replace the plan with a JSON draft or a markdown document
    Create {
        #[arg(long)]
        file: PathBuf,
    },

    /// Print the plan
    Show,

    /// Print the first todo task
    Next,

    /// List blocked tasks
    Blocked,

    /// List tasks flagged for review
    Review,

    /// Task counts per status
    Progress,

    /// Mark a task in progress
    Start { step: String },

    /// Mark a task done today
    Done { step: String },

    /// Mark a task blocked
    Block { step: String, reason: String },

    /// Flag a task for review
    Flag { step: String, note: String },

    /// Move a task back to todo
    Reset { step: String },

    /// Append a dated line to the Notes section
    Note { text: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Print an error with its kind and, when known, how to fix it.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<sheetdrive_core::Error>() {
        Some(core) => {
            eprintln!("error ({}): {:#}", core.kind(), err);
            if let Some(hint) = core.hint() {
                eprintln!("hint: {}", hint);
            }
        }
        None => eprintln!("error: {:#}", err),
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = sheetdrive_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sheetdrive starting");

    let executor = build_executor(&args, &config)?;

    match args.command {
        Command::Init { force } => cmd_init(executor, &config, force).await,
        Command::Ls { json } => cmd_ls(&open_store(executor, &config).await?, json).await,
        Command::Cat { name, meta } => {
            cmd_cat(&open_store(executor, &config).await?, &name, meta).await
        }
        Command::Write(write) => cmd_write(&open_store(executor, &config).await?, write).await,
        Command::Rm { name } => cmd_rm(&open_store(executor, &config).await?, &name).await,
        Command::Deps => cmd_deps(&open_store(executor, &config).await?).await,
        Command::Range(range) => cmd_range(&executor, range).await,
        Command::Plan(plan) => {
            let tracker = PlanTracker::new(open_store(executor, &config).await?);
            cmd_plan(&tracker, plan).await
        }
    }
}

fn build_executor(args: &Args, config: &Config) -> Result<Arc<RequestExecutor>> {
    let Some(spreadsheet_id) = args
        .spreadsheet
        .clone()
        .or_else(|| config.sheets.spreadsheet_id.clone())
    else {
        bail!("no spreadsheet id; pass --spreadsheet or set sheets.spreadsheet_id in the config file");
    };

    let mut sources = CredentialSources::from_config(&config.auth);
    if let Some(path) = &args.credentials {
        sources = sources.with_path(path);
    }

    let connector = ServiceAccountConnector::new(&sources, &spreadsheet_id, config)
        .context("failed to load credentials")?;
    Ok(Arc::new(RequestExecutor::new(
        Arc::new(connector),
        config.retry.policy(),
    )))
}

/// Open the store, migrating a legacy layout on first contact.
async fn open_store(executor: Arc<RequestExecutor>, config: &Config) -> Result<FileStore> {
    FileStore::connect(executor, config.store.clone())
        .await
        .context("failed to open file store")
}

async fn cmd_init(executor: Arc<RequestExecutor>, config: &Config, force: bool) -> Result<()> {
    let mut store = FileStore::open(executor, config.store.clone())
        .await
        .context("failed to open file store")?;
    let before = store.layout();
    let outcome = store.initialize(force).await?;

    println!("Layout:  {}", before);
    println!("Outcome: {}", outcome);
    match &outcome {
        sheetdrive_core::InitOutcome::Repaired { salvaged } => {
            println!("Salvaged {} file(s)", salvaged)
        }
        sheetdrive_core::InitOutcome::Seeded { files } => {
            println!("Created {}", files.join(", "))
        }
        _ => {}
    }
    Ok(())
}

async fn cmd_ls(store: &FileStore, json: bool) -> Result<()> {
    let files = store.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No files.");
        return Ok(());
    }
    let width = files.iter().map(|f| f.name.len()).max().unwrap_or(0);
    for file in &files {
        println!(
            "{:<width$}  {:>7}  {:<10}  {}",
            file.name,
            file.content_length,
            file.status.as_str(),
            file.updated_at.format("%Y-%m-%d %H:%M"),
            width = width
        );
    }
    Ok(())
}

async fn cmd_cat(store: &FileStore, name: &str, meta: bool) -> Result<()> {
    let Some(file) = store.read(name).await? else {
        bail!("no file named {}", name);
    };
    if meta {
        println!("{}", serde_json::to_string_pretty(&file)?);
    } else {
        print!("{}", file.content);
        if !file.content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn read_content(content: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(content) = content {
        return Ok(content);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read content from stdin")?;
    Ok(buf)
}

async fn cmd_write(store: &FileStore, args: WriteArgs) -> Result<()> {
    let content = read_content(args.content, args.file.as_deref())?;

    let mut write = FileWrite::new(args.name, content);
    if let Some(description) = args.description {
        write = write.description(description);
    }
    if let Some(tags) = args.tags {
        write = write.tags(tags.split(',').map(str::trim).filter(|t| !t.is_empty()));
    }
    if let Some(status) = args.status {
        write = write.status(status);
    }
    if let Some(path) = args.path {
        write = write.path(path);
    }
    if let Some(depends_on) = args.depends_on {
        write = write.depends_on(depends_on);
    }
    if let Some(max) = args.max_length {
        write = write.max_content_length(max);
    }

    let file = if args.create {
        store.create(write).await?
    } else {
        store.write(write).await?
    };
    println!(
        "Wrote {} ({} chars, hash {})",
        file.meta.name, file.meta.content_length, file.meta.hash
    );
    Ok(())
}

async fn cmd_rm(store: &FileStore, name: &str) -> Result<()> {
    if store.delete(name).await? {
        println!("Deleted {}", name);
    } else {
        println!("No file named {}", name);
    }
    Ok(())
}

async fn cmd_deps(store: &FileStore) -> Result<()> {
    let dangling = store.check_dependencies().await?;
    if dangling.is_empty() {
        println!("All dependencies resolve.");
        return Ok(());
    }
    for dep in &dangling {
        println!("{} depends on missing {}", dep.file, dep.depends_on);
    }
    Ok(())
}

// ============================================
// Ranges
// ============================================

fn record_to_json(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(key, cell)| (key.clone(), cell.to_json()))
            .collect(),
    )
}

/// Rows (`[[...], ...]`) or records (`[{...}, ...]`) from JSON text.
fn parse_write_data(json: &str) -> Result<WriteData> {
    let value: Value = serde_json::from_str(json).context("--json is not valid JSON")?;
    let Value::Array(items) = value else {
        bail!("--json must be an array of rows or of objects");
    };

    if items.iter().all(Value::is_object) && !items.is_empty() {
        let records = items
            .iter()
            .filter_map(Value::as_object)
            .map(|object| {
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), CellValue::from_json(value)))
                    .collect::<Record>()
            })
            .collect();
        return Ok(WriteData::records(records));
    }

    let mut rows = Vec::with_capacity(items.len());
    for item in &items {
        let Value::Array(cells) = item else {
            bail!("--json rows must all be arrays, or all be objects");
        };
        rows.push(cells.iter().map(CellValue::from_json).collect());
    }
    Ok(WriteData::Grid(rows))
}

fn parse_conditions(raw: &[String]) -> Result<Vec<Condition>> {
    raw.iter()
        .map(|pair| {
            let Some((column, value)) = pair.split_once('=') else {
                bail!("condition {:?} is not COLUMN=VALUE", pair);
            };
            Ok(Condition::new(column.trim(), value))
        })
        .collect()
}

async fn cmd_range(executor: &RequestExecutor, command: RangeCommand) -> Result<()> {
    match command {
        RangeCommand::Get { range, records } => {
            let range = A1Range::parse(&range)?;
            let output = if records {
                let (_, records) = executor.read_records(&range).await?;
                Value::Array(records.iter().map(record_to_json).collect())
            } else {
                let grid = executor.read_range(&range).await?;
                Value::Array(
                    grid.iter()
                        .map(|row| Value::Array(row.iter().map(CellValue::to_json).collect()))
                        .collect(),
                )
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        RangeCommand::Set { range, json } => {
            let range = A1Range::parse(&range)?;
            executor.write_range(&range, parse_write_data(&json)?).await?;
            println!("Updated {}", range);
        }
        RangeCommand::Append { range, json } => {
            let range = A1Range::parse(&range)?;
            executor.append_range(&range, parse_write_data(&json)?).await?;
            println!("Appended to {}", range);
        }
        RangeCommand::Clear { range } => {
            let range = A1Range::parse(&range)?;
            executor.clear_range(&range).await?;
            println!("Cleared {}", range);
        }
        RangeCommand::Find {
            range,
            conditions,
            loose,
        } => {
            let range = A1Range::parse(&range)?;
            let mode = if loose {
                MatchMode::Loose
            } else {
                MatchMode::Strict
            };
            let found = executor
                .find_records(&range, &parse_conditions(&conditions)?, mode)
                .await?;
            let output = Value::Array(found.iter().map(record_to_json).collect());
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

// ============================================
// Plan
// ============================================

fn print_task(task: &Task) {
    println!("{} [{}] {}", task.step, task.status(), task.title);
}

fn print_tasks(tasks: &[Task], empty: &str) {
    if tasks.is_empty() {
        println!("{}", empty);
    }
    for task in tasks {
        print_task(task);
    }
}

async fn cmd_plan(tracker: &PlanTracker, command: PlanCommand) -> Result<()> {
    match command {
        PlanCommand::Create { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let is_json = file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            let plan = if is_json {
                let draft: PlanDraft =
                    serde_json::from_str(&text).context("failed to parse plan draft")?;
                tracker.create_plan(draft).await?
            } else {
                let plan = Plan::parse(&text);
                tracker.save(&plan).await?;
                plan
            };
            println!(
                "Created plan {:?} with {} task(s)",
                plan.title.as_deref().unwrap_or(""),
                plan.tasks().count()
            );
        }
        PlanCommand::Show => print!("{}", tracker.load().await?),
        PlanCommand::Next => match tracker.next_task().await? {
            Some(task) => print_task(&task),
            None => println!("No todo tasks."),
        },
        PlanCommand::Blocked => print_tasks(&tracker.blocked_tasks().await?, "No blocked tasks."),
        PlanCommand::Review => print_tasks(&tracker.review_tasks().await?, "Nothing to review."),
        PlanCommand::Progress => {
            let progress = tracker.progress().await?;
            println!("Todo:     {}", progress.todo);
            println!("Doing:    {}", progress.doing);
            println!("Done:     {}", progress.done);
            println!("Blocked:  {}", progress.blocked);
            println!("Review:   {}", progress.review);
            println!(
                "Complete: {}% of {}",
                progress.percent_done(),
                progress.total()
            );
        }
        PlanCommand::Start { step } => print_task(&tracker.start_task(&step).await?),
        PlanCommand::Done { step } => print_task(&tracker.complete_task(&step).await?),
        PlanCommand::Block { step, reason } => {
            print_task(&tracker.block_task(&step, &reason).await?)
        }
        PlanCommand::Flag { step, note } => print_task(&tracker.review_task(&step, &note).await?),
        PlanCommand::Reset { step } => print_task(&tracker.reset_task(&step).await?),
        PlanCommand::Note { text } => {
            tracker.append_note(&text).await?;
            println!("Noted.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write_data_rows_and_records() {
        let rows = parse_write_data(r#"[["a", 1], [true, null]]"#).unwrap();
        assert_eq!(
            rows,
            WriteData::Grid(vec![
                vec![CellValue::text("a"), CellValue::Number(1.0)],
                vec![CellValue::Bool(true), CellValue::Empty],
            ])
        );

        let records = parse_write_data(r#"[{"name": "x", "n": 2}]"#).unwrap();
        assert!(matches!(records, WriteData::Records { .. }));

        assert!(parse_write_data(r#"{"not": "an array"}"#).is_err());
        assert!(parse_write_data(r#"[["ok"], {"mixed": 1}]"#).is_err());
    }

    #[test]
    fn test_parse_conditions() {
        let conditions = parse_conditions(&["status=open".into(), "n = 2".into()]).unwrap();
        assert_eq!(conditions[0], Condition::new("status", "open"));
        assert_eq!(conditions[1], Condition::new("n", " 2"));
        assert!(parse_conditions(&["nothing".into()]).is_err());
    }
}
