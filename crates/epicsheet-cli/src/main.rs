#![forbid(unsafe_code)]

mod agent;
mod cmd;
mod output;
mod validate;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::Context;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "es",
    author,
    version,
    about = "epicsheet: epic tracking on top of a spreadsheet",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/epicsheet/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format; defaults to pretty on a terminal and text when piped.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Author recorded on updates (skips env resolution).
    #[arg(long, global = true)]
    author: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn context(&self) -> Context {
        Context {
            config_path: self.config.clone(),
            output: self.output_mode(),
            author_flag: self.author.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create the workbook tables",
        long_about = "Create the epics, status and metadata sheets that are missing. A brand new workbook starts at the current schema version.",
        after_help = "EXAMPLES:\n    # Initialize a local workbook\n    EPICSHEET_BACKEND=sqlite:./epics.db es init\n\n    # Emit machine-readable output\n    es init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Read",
        about = "List epics",
        long_about = "List epics with their status snapshot, optionally filtered by state or assignee.",
        after_help = "EXAMPLES:\n    # Everything\n    es list\n\n    # Epics in testing owned by @kim\n    es list --status testing --assignee @kim\n\n    # Emit machine-readable output\n    es list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one epic",
        long_about = "Show an epic, its per-platform progress and its most recent updates.",
        after_help = "EXAMPLES:\n    # By id\n    es show PROJ-123\n\n    # By tracker URL\n    es show https://company.atlassian.net/browse/PROJ-123"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show an epic's update history",
        long_about = "Read an epic's events from its quarterly partition, newest first.",
        after_help = "EXAMPLES:\n    # Last 50 events\n    es timeline PROJ-123\n\n    # Last 5\n    es timeline PROJ-123 -n 5"
    )]
    Timeline(cmd::timeline::TimelineArgs),

    #[command(
        next_help_heading = "Read",
        about = "Team-wide progress",
        long_about = "Active epic count, epics per state, average platform progress and open blockers.",
        after_help = "EXAMPLES:\n    es team\n    es team --json"
    )]
    Team(cmd::team::TeamArgs),

    #[command(
        next_help_heading = "Read",
        about = "List unresolved blockers",
        long_about = "List blockers that have no later resolution on the same platform, grouped by epic.",
        after_help = "EXAMPLES:\n    es blockers\n    es blockers --json"
    )]
    Blockers(cmd::blocker::BlockersArgs),

    #[command(
        next_help_heading = "Read",
        about = "Epics assigned to you",
        long_about = "Epics assigned to a person, split into active and completed. Defaults to the resolved author.",
        after_help = "EXAMPLES:\n    # Your epics\n    es --author @kim mine\n\n    # Someone else's Android work\n    es mine --assignee @lee --platform android"
    )]
    Mine(cmd::mine::MineArgs),

    #[command(
        next_help_heading = "Write",
        about = "Create an epic",
        long_about = "Register a new epic. The id is taken from the tracker URL; all fields are validated before anything is written.",
        after_help = "EXAMPLES:\n    es create --name \"Checkout redesign\" \\\n        --url https://company.atlassian.net/browse/PROJ-123 \\\n        --ios @kim --android @lee --js @park \\\n        --start 2026-01-05 --target 2026-03-31"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Write",
        about = "Record platform progress",
        long_about = "Set one platform's percent complete and log a progress event.",
        after_help = "EXAMPLES:\n    es progress PROJ-123 --platform ios --value 60\n    es progress PROJ-123 -p js --value 40 -m \"API wired\""
    )]
    Progress(cmd::progress::ProgressArgs),

    #[command(
        next_help_heading = "Write",
        about = "Mark a platform complete",
        long_about = "Set one platform to 100% and log that its development is complete.",
        after_help = "EXAMPLES:\n    es complete PROJ-123 --platform android"
    )]
    Complete(cmd::progress::CompleteArgs),

    #[command(
        next_help_heading = "Write",
        about = "Comment on an epic",
        long_about = "Store a note as the epic's latest comment and log it.",
        after_help = "EXAMPLES:\n    es comment PROJ-123 \"Design review moved to Thursday\"\n    es comment PROJ-123 \"Crash on launch fixed\" --platform ios"
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Write",
        about = "Report a blocker",
        long_about = "Log a blocker for one platform of an epic.",
        after_help = "EXAMPLES:\n    es block PROJ-123 --platform ios \"Signing certificate expired\""
    )]
    Block(cmd::blocker::BlockArgs),

    #[command(
        next_help_heading = "Write",
        about = "Resolve a blocker",
        long_about = "Log the resolution of a platform's blocker. Earlier blockers on that platform stop being reported.",
        after_help = "EXAMPLES:\n    es resolve PROJ-123 --platform ios \"Certificate renewed\""
    )]
    Resolve(cmd::blocker::ResolveArgs),

    #[command(
        next_help_heading = "Write",
        about = "Change an epic's state",
        long_about = "Move an epic to another workflow state and log the change.",
        after_help = "EXAMPLES:\n    es status PROJ-123 development\n    es status PROJ-123 on_hold --reason \"waiting on legal\""
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Schema",
        about = "Migrate the workbook now",
        long_about = "Run any pending schema migration immediately. Normally it runs on first access.",
        after_help = "EXAMPLES:\n    es migrate\n    es migrate --json"
    )]
    Migrate(cmd::migrate::MigrateArgs),

    #[command(
        next_help_heading = "Schema",
        about = "Show the schema version",
        long_about = "Show the stored and expected schema versions without migrating.",
        after_help = "EXAMPLES:\n    es schema-version"
    )]
    SchemaVersion(cmd::schema_version::SchemaVersionArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        long_about = "Generate a shell completion script and write it to stdout.",
        after_help = "EXAMPLES:\n    es completions bash > ~/.local/share/bash-completion/completions/es\n    es completions zsh > ~/.zfunc/_es"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EPICSHEET_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "epicsheet=debug,es=debug,info"
        } else {
            "epicsheet=info,es=info,warn"
        })
    });

    let format = env::var("EPICSHEET_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }
    let ctx = cli.context();

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, &ctx),
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::Show(args) => cmd::show::run_show(args, &ctx),
        Commands::Timeline(args) => cmd::timeline::run_timeline(args, &ctx),
        Commands::Team(args) => cmd::team::run_team(args, &ctx),
        Commands::Blockers(args) => cmd::blocker::run_blockers(args, &ctx),
        Commands::Mine(args) => cmd::mine::run_mine(args, &ctx),
        Commands::Create(args) => cmd::create::run_create(args, &ctx),
        Commands::Progress(args) => cmd::progress::run_progress(args, &ctx),
        Commands::Complete(args) => cmd::progress::run_complete(args, &ctx),
        Commands::Comment(args) => cmd::comment::run_comment(args, &ctx),
        Commands::Block(args) => cmd::blocker::run_block(args, &ctx),
        Commands::Resolve(args) => cmd::blocker::run_resolve(args, &ctx),
        Commands::Status(args) => cmd::status::run_status(args, &ctx),
        Commands::Migrate(args) => cmd::migrate::run_migrate(args, &ctx),
        Commands::SchemaVersion(args) => cmd::schema_version::run_schema_version(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
