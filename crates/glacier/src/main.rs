//! glacier: unattended backups with restic.
//!
//! A helper utility for restic, a fast and secure backup program. Restic
//! supports many backends for storing backups natively, including AWS S3,
//! Openstack Swift, Backblaze B2, Microsoft Azure Blob Storage, and Google
//! Cloud Storage.
//!
//! glacier simplifies the use of restic in unattended setups: repository
//! credentials come from environment variables or mounted secret files,
//! and backups can be repeated on a cron schedule. The tool is typically
//! run within a Docker container, where it also supports Docker secrets.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::Result;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use glacier_restic::{KeepPolicy, Restic, ResticError};

mod schedule;
mod vars;

#[derive(Parser)]
#[command(name = "glacier")]
#[command(about = "Create a backup or restore from a restic repository", long_about = None)]
struct Cli {
    /// Level of logging to use: error, warn, info, debug, trace
    #[arg(
        long,
        short = 'l',
        env = "RESTIC_LOGLEVEL",
        default_value = "info",
        global = true
    )]
    log_level: String,

    /// Log format to use (schedule defaults to pretty)
    #[arg(long, short = 'f', env = "RESTIC_LOGFORMAT", value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Plain console output without timestamp or level prefixes
    Default,
    /// Semi-structured messages with a timestamp and level prefix
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a remote backup of specified path
    Backup {
        #[command(flatten)]
        backup: BackupArgs,
    },

    /// Restore a remote backup to a local path
    Restore {
        /// Existing local path to restore the snapshot to
        path: PathBuf,

        /// ID of the snapshot to restore
        #[arg(long, default_value = "latest")]
        snapshot: String,
    },

    /// Remove old snapshots according to rotation schedule
    Forget {
        #[command(flatten)]
        keep: KeepArgs,
    },

    /// List all snapshots
    Snapshots,

    /// Test the repository for errors
    Check,

    /// Run a backup using cron schedule
    Schedule {
        /// Cron expression for the backup job (five fields, optional
        /// seconds, or a descriptor such as @daily)
        cron: String,

        /// Remove old snapshots according to rotation schedule
        #[arg(long, value_name = "CRON")]
        forget: Option<String>,

        /// Sustain processing of scheduled jobs despite errors
        #[arg(long)]
        sustained: bool,

        #[command(flatten)]
        backup: BackupArgs,

        #[command(flatten)]
        keep: KeepArgs,
    },

    /// List the supported environment variables
    List {
        /// Display all available variables instead of only the set ones
        #[arg(long, short = 'a')]
        all: bool,
    },

    /// Display version information
    Version,
}

#[derive(Args)]
struct BackupArgs {
    /// Local path to backup
    #[arg(long, short = 'p', env = "RESTIC_BACKUP_PATH")]
    path: Option<PathBuf>,

    /// Hostname to use in backups (defaults to $HOSTNAME)
    #[arg(long, short = 'H', env = "RESTIC_HOST")]
    host: Option<String>,

    /// Initialize the repository if it does not exist yet
    #[arg(long)]
    init: bool,
}

#[derive(Args, Default)]
struct KeepArgs {
    /// Never delete the n last (most recent) snapshots
    #[arg(long, value_name = "N")]
    keep_last: Option<u32>,

    /// For the last n hours in which a snapshot was made, keep only the
    /// last snapshot for each hour
    #[arg(long, value_name = "N")]
    keep_hourly: Option<u32>,

    /// For the last n days which have one or more snapshots, only keep
    /// the last one for that day
    #[arg(long, value_name = "N")]
    keep_daily: Option<u32>,

    /// For the last n weeks which have one or more snapshots, only keep
    /// the last one for that week
    #[arg(long, value_name = "N")]
    keep_weekly: Option<u32>,

    /// For the last n months which have one or more snapshots, only keep
    /// the last one for that month
    #[arg(long, value_name = "N")]
    keep_monthly: Option<u32>,

    /// For the last n years which have one or more snapshots, only keep
    /// the last one for that year
    #[arg(long, value_name = "N")]
    keep_yearly: Option<u32>,

    /// Keep all snapshots which have all tags specified by this option
    /// (can be specified multiple times)
    #[arg(long, value_name = "TAG")]
    keep_tag: Vec<String>,

    /// Keep all snapshots which have been made within the duration of
    /// the latest snapshot
    #[arg(long, value_name = "DURATION")]
    keep_within: Option<String>,
}

impl From<&KeepArgs> for KeepPolicy {
    fn from(args: &KeepArgs) -> Self {
        KeepPolicy {
            last: args.keep_last,
            hourly: args.keep_hourly,
            daily: args.keep_daily,
            weekly: args.keep_weekly,
            monthly: args.keep_monthly,
            yearly: args.keep_yearly,
            tags: args.keep_tag.clone(),
            within: args.keep_within.clone(),
        }
    }
}

/// Initialize tracing with the requested level and format.
fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|_| miette::miette!("invalid log level '{}'", level))?;

    match format {
        LogFormat::Default => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_target(false)
                    .with_level(false),
            )
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
    Ok(())
}

/// Log a command failure and terminate the process when it is fatal;
/// non-fatal failures only produce an error log.
fn handle_restic(result: Result<(), ResticError>, context: &str) -> Result<()> {
    if let Err(err) = result {
        error!(error = %err, "{context}");
        if err.is_fatal() {
            std::process::exit(1);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // recurring runs are long-lived, so they default to timestamped logs
    let format = cli.log_format.unwrap_or(match &cli.command {
        Commands::Schedule { .. } => LogFormat::Pretty,
        _ => LogFormat::Default,
    });
    init_tracing(&cli.log_level, format)?;

    match cli.command {
        Commands::Backup { backup } => {
            let path = backup
                .path
                .ok_or_else(|| miette::miette!("no backup path provided"))?;
            let restic = Restic::new();
            handle_restic(
                restic.backup(&path, backup.init, backup.host.as_deref()).await,
                "error running backup",
            )
        }

        Commands::Restore { path, snapshot } => {
            if !path.exists() {
                return Err(miette::miette!("restore path '{}' does not exist", path.display()));
            }
            handle_restic(
                Restic::new().restore(&path, &snapshot).await,
                "error running restore",
            )
        }

        Commands::Forget { keep } => handle_restic(
            Restic::new().forget(&KeepPolicy::from(&keep)).await,
            "error running forget",
        ),

        Commands::Snapshots => handle_restic(
            Restic::new().snapshots().await,
            "error retrieving snapshots",
        ),

        Commands::Check => handle_restic(Restic::new().check().await, "error executing check"),

        Commands::Schedule {
            cron,
            forget,
            sustained,
            backup,
            keep,
        } => {
            let path = backup
                .path
                .ok_or_else(|| miette::miette!("no backup path provided"))?;
            let keep = KeepPolicy::from(&keep);
            if let Err(err) =
                schedule::run(cron, forget, path, backup.init, backup.host, sustained, keep).await
            {
                // any schedule failure ends the process
                error!(error = %err, "error running schedule command");
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::List { all } => {
            vars::list(all);
            Ok(())
        }

        Commands::Version => {
            info!("glacier version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
