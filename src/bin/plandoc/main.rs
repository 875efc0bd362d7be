//! plandoc CLI tool
//!
//! Command-line interface over the planning record in `.planning/`.
//!
//! Every command prints one JSON document on stdout, or a terse scalar with `--raw` where
//! the command has one. Payloads above 50,000 bytes are written to a temporary file and
//! printed as `@file:<path>`. Failures print `Error: <message>` on stderr.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Args, Parser, Subcommand};
use plandoc_core::{
    commands::{execute, Op},
    output,
    repo::Repository,
    roadmap::ProgressFormat,
    state::Metric,
    verify::Schema,
    PlanError,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plandoc")]
#[command(author, version, about = "Maintain a file-based project planning record", long_about = None)]
struct Cli {
    /// Project root containing `.planning/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Print the terse scalar form instead of JSON where one exists
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read and edit STATE.md
    #[command(subcommand)]
    State(StateCommand),
    /// Find, number, add, insert, remove and complete units
    #[command(subcommand)]
    Unit(UnitCommand),
    /// Query and update ROADMAP.md
    #[command(subcommand)]
    Roadmap(RoadmapCommand),
    /// Edit REQUIREMENTS.md
    #[command(subcommand)]
    Requirements(RequirementsCommand),
    /// Archive a milestone
    #[command(subcommand)]
    Milestone(MilestoneCommand),
    /// Check the planning tree for drift
    #[command(subcommand)]
    Validate(ValidateCommand),
    /// Verify jobs, units, artifacts, links, commits and summaries
    #[command(subcommand)]
    Verify(VerifyCommand),
    /// Parallel workstreams and their branches
    #[command(subcommand)]
    Workstreams(WorkstreamsCommand),
    /// Read and edit document metadata blocks
    #[command(subcommand)]
    Frontmatter(FrontmatterCommand),
    /// Read and edit `.planning/config.toml`
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Project history from summary metadata
    #[command(subcommand)]
    History(HistoryCommand),
    /// Commit planning documents to version control
    Commit {
        message: String,
        /// Paths to stage (default: the planning directory)
        #[arg(long, num_args = 1..)]
        files: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StateCommand {
    /// Config, document presence and the parsed state
    Load,
    /// A field or section; the whole document without a key
    Get { key: Option<String> },
    /// Set fields: `--Field value` or `Field=value` pairs
    Patch {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 1..)]
        fields: Vec<String>,
    },
    /// Move to the next job of the current unit
    AdvanceJob,
    /// Append a row to the performance metrics table
    RecordMetric(MetricArgs),
    AddDecision {
        text: String,
        #[arg(long)]
        unit: Option<String>,
    },
    AddBlocker { text: String },
    ResolveBlocker { text: String },
    RecordSession {
        #[arg(long)]
        stopped_at: String,
        #[arg(long)]
        resume_file: Option<String>,
    },
    /// Recompute the progress bar from summaries on disk
    UpdateProgress,
    Snapshot,
}

#[derive(Args)]
struct MetricArgs {
    #[arg(long)]
    unit: String,
    #[arg(long)]
    job: String,
    #[arg(long)]
    duration: String,
    #[arg(long, default_value = "-")]
    tasks: String,
    #[arg(long, default_value = "-")]
    files: String,
}

#[derive(Subcommand)]
enum UnitCommand {
    Find { id: String },
    /// Next free decimal id after a unit
    NextDecimal { id: String },
    /// Append a unit at the end of the roadmap
    Add {
        name: String,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        depends: Option<String>,
    },
    /// Insert a decimal unit after an existing one
    Insert {
        after: String,
        name: String,
        #[arg(long)]
        goal: Option<String>,
    },
    /// Remove a unit and renumber everything after it
    Remove {
        id: String,
        /// Remove even when the unit has summaries
        #[arg(long)]
        force: bool,
    },
    Complete { id: String },
}

#[derive(Subcommand)]
enum RoadmapCommand {
    GetUnit { id: String },
    Analyze,
    UpdateJobProgress { id: String },
    Progress {
        /// json, table or bar
        #[arg(default_value = "json")]
        format: ProgressFormat,
    },
}

#[derive(Subcommand)]
enum RequirementsCommand {
    /// Mark requirement ids complete (comma or space separated)
    MarkComplete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MilestoneCommand {
    Complete {
        version: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ValidateCommand {
    Consistency,
    Health {
        /// Apply safe repairs
        #[arg(long)]
        repair: bool,
    },
}

#[derive(Subcommand)]
enum VerifyCommand {
    JobStructure { file: String },
    UnitCompleteness { id: String },
    Artifacts { file: String },
    KeyLinks { file: String },
    Commits {
        #[arg(required = true, num_args = 1..)]
        hashes: Vec<String>,
    },
    Summary { file: String },
}

#[derive(Subcommand)]
enum WorkstreamsCommand {
    Analyze,
    /// Create branches for every parallel candidate
    Provision {
        #[arg(long)]
        dry_run: bool,
    },
    Reconcile,
}

#[derive(Subcommand)]
enum FrontmatterCommand {
    Get {
        file: String,
        #[arg(long)]
        field: Option<String>,
    },
    Set {
        file: String,
        #[arg(long)]
        field: String,
        #[arg(long)]
        value: String,
    },
    Merge {
        file: String,
        /// A JSON object
        #[arg(long)]
        data: String,
    },
    Validate {
        file: String,
        /// job, summary or verification (inferred from the file name by default)
        #[arg(long)]
        schema: Option<Schema>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Get { key: String },
    Set { key: String, value: String },
    Init,
}

#[derive(Subcommand)]
enum HistoryCommand {
    Digest,
}

/// `--Field value` and `Field=value` pairs. Field names keep their case; underscores and
/// dashes read as spaces so `--stopped_at` matches `Stopped At`.
fn patch_fields(args: &[String]) -> Result<Vec<(String, String)>, PlanError> {
    let mut fields = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            let value = iter
                .next()
                .ok_or_else(|| PlanError::Command(format!("missing value for --{name}")))?;
            fields.push((name.replace(['_', '-'], " "), value.clone()));
        } else if let Some((name, value)) = arg.split_once('=') {
            fields.push((name.trim().to_string(), value.to_string()));
        } else {
            return Err(PlanError::Command(format!(
                "expected --Field value or Field=value, got '{arg}'"
            )));
        }
    }
    Ok(fields)
}

impl Commands {
    fn into_op(self) -> Result<Op, PlanError> {
        let op = match self {
            Commands::State(cmd) => match cmd {
                StateCommand::Load => Op::StateLoad,
                StateCommand::Get { key } => Op::StateGet(key),
                StateCommand::Patch { fields } => Op::StatePatch(patch_fields(&fields)?),
                StateCommand::AdvanceJob => Op::StateAdvanceJob,
                StateCommand::RecordMetric(m) => Op::StateRecordMetric(Metric {
                    unit: m.unit,
                    job: m.job,
                    duration: m.duration,
                    tasks: m.tasks,
                    files: m.files,
                }),
                StateCommand::AddDecision { text, unit } => Op::StateAddDecision { unit, text },
                StateCommand::AddBlocker { text } => Op::StateAddBlocker(text),
                StateCommand::ResolveBlocker { text } => Op::StateResolveBlocker(text),
                StateCommand::RecordSession {
                    stopped_at,
                    resume_file,
                } => Op::StateRecordSession {
                    stopped_at,
                    resume_file,
                },
                StateCommand::UpdateProgress => Op::StateUpdateProgress,
                StateCommand::Snapshot => Op::StateSnapshot,
            },
            Commands::Unit(cmd) => match cmd {
                UnitCommand::Find { id } => Op::UnitFind(id),
                UnitCommand::NextDecimal { id } => Op::UnitNextDecimal(id),
                UnitCommand::Add {
                    name,
                    goal,
                    depends,
                } => Op::UnitAdd {
                    name,
                    goal,
                    depends,
                },
                UnitCommand::Insert { after, name, goal } => Op::UnitInsert { after, name, goal },
                UnitCommand::Remove { id, force } => Op::UnitRemove { id, force },
                UnitCommand::Complete { id } => Op::UnitComplete(id),
            },
            Commands::Roadmap(cmd) => match cmd {
                RoadmapCommand::GetUnit { id } => Op::RoadmapGetUnit(id),
                RoadmapCommand::Analyze => Op::RoadmapAnalyze,
                RoadmapCommand::UpdateJobProgress { id } => Op::RoadmapUpdateJobProgress(id),
                RoadmapCommand::Progress { format } => Op::RoadmapProgress(format),
            },
            Commands::Requirements(RequirementsCommand::MarkComplete { ids }) => {
                Op::RequirementsMarkComplete(ids)
            }
            Commands::Milestone(MilestoneCommand::Complete { version, name }) => {
                Op::MilestoneComplete { version, name }
            }
            Commands::Validate(cmd) => match cmd {
                ValidateCommand::Consistency => Op::ValidateConsistency,
                ValidateCommand::Health { repair } => Op::ValidateHealth { repair },
            },
            Commands::Verify(cmd) => match cmd {
                VerifyCommand::JobStructure { file } => Op::VerifyJobStructure(file),
                VerifyCommand::UnitCompleteness { id } => Op::VerifyUnitCompleteness(id),
                VerifyCommand::Artifacts { file } => Op::VerifyArtifacts(file),
                VerifyCommand::KeyLinks { file } => Op::VerifyKeyLinks(file),
                VerifyCommand::Commits { hashes } => Op::VerifyCommits(hashes),
                VerifyCommand::Summary { file } => Op::VerifySummary(file),
            },
            Commands::Workstreams(cmd) => match cmd {
                WorkstreamsCommand::Analyze => Op::WorkstreamsAnalyze,
                WorkstreamsCommand::Provision { dry_run } => Op::WorkstreamsProvision { dry_run },
                WorkstreamsCommand::Reconcile => Op::WorkstreamsReconcile,
            },
            Commands::Frontmatter(cmd) => match cmd {
                FrontmatterCommand::Get { file, field } => Op::FrontmatterGet { file, field },
                FrontmatterCommand::Set { file, field, value } => {
                    Op::FrontmatterSet { file, field, value }
                }
                FrontmatterCommand::Merge { file, data } => Op::FrontmatterMerge { file, data },
                FrontmatterCommand::Validate { file, schema } => {
                    Op::FrontmatterValidate { file, schema }
                }
            },
            Commands::Config(cmd) => match cmd {
                ConfigCommand::Get { key } => Op::ConfigGet(key),
                ConfigCommand::Set { key, value } => Op::ConfigSet { key, value },
                ConfigCommand::Init => Op::ConfigInit,
            },
            Commands::History(HistoryCommand::Digest) => Op::HistoryDigest,
            Commands::Commit { message, files } => Op::Commit { message, files },
        };
        Ok(op)
    }
}

fn run(cli: Cli) -> Result<String, PlanError> {
    let op = cli.command.into_op()?;
    let repo = Repository::open(&cli.root)?;
    let result = execute(&repo, &op)?;
    let text = result.render(cli.raw)?;
    Ok(output::spill(text)?.line())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(line) => println!("{line}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
