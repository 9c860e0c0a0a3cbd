mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use repomirror_core::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "repomirror",
    version,
    about = "Bare git mirrors with a searchable file index",
    long_about = "repomirror keeps bare mirrors of upstream git repositories, indexes their\n\
        files into SQLite, and answers content, filename and symbol searches.\n\n\
        Quick start:\n  \
        repomirror import demo https://github.com/org/demo.git\n  \
        repomirror search demo \"load_config\"\n  \
        repomirror serve"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: ~/.repomirror/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a repository and index it from scratch
    ///
    /// Re-running against an existing mirror repairs it and re-indexes.
    ///
    /// Example: repomirror import demo https://github.com/org/demo.git
    Import {
        /// Repository name (mirror directory and index key)
        name: String,
        /// Upstream clone url or local path
        url: String,
    },
    /// Fetch and apply the changes between two revisions
    ///
    /// Examples:
    ///   repomirror sync demo
    ///   repomirror sync demo --rev 4f2a9c1 --old-rev 9e07b3d
    Sync {
        name: String,
        /// Target revision (default: HEAD of the mirror)
        #[arg(long, default_value = "HEAD")]
        rev: String,
        /// Starting revision (default: last indexed commit)
        #[arg(long)]
        old_rev: Option<String>,
    },
    /// Queue an import or sync job for the worker
    Enqueue {
        name: String,
        /// Job kind: "sync" or "import"
        #[arg(long, default_value = "sync")]
        kind: String,
        /// Source url (required for imports)
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        rev: Option<String>,
        #[arg(long)]
        old_rev: Option<String>,
        /// Idempotency id; derived from the other fields when absent
        #[arg(long)]
        id: Option<String>,
    },
    /// Show one job
    Job { job_id: String },
    /// List jobs, newest first
    Jobs {
        #[arg(long)]
        repo: Option<String>,
        /// pending, running, completed or failed
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Search a mirrored repository
    ///
    /// Examples:
    ///   repomirror search demo "load_config"
    ///   repomirror search demo "config" --mode filename
    ///   repomirror search demo "Loader" --mode class --lang python
    Search {
        name: String,
        query: String,
        /// content, filename, function or class
        #[arg(long, default_value = "content")]
        mode: String,
        /// Path glob (content mode only)
        #[arg(long)]
        glob: Option<String>,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        r#ref: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show commit metadata and the files it changed
    Log {
        name: String,
        #[arg(long)]
        r#ref: Option<String>,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// File, commit and language counts for a repository
    Stats { name: String },
    /// List tracked repositories
    Repos,
    /// Delete expired jobs and fail jobs abandoned in running
    Cleanup,
    /// Serve the HTTP API with one background sync worker
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_file = cli.config.as_deref().map(std::path::Path::new);
    let config = Config::load_with_file(config_file).context("Failed to load configuration")?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Import { name, url } => commands::sync::run_import(&config, &name, &url)?,
        Commands::Sync { name, rev, old_rev } => {
            commands::sync::run_sync(&config, &name, &rev, old_rev.as_deref())?
        }
        Commands::Enqueue {
            name,
            kind,
            url,
            rev,
            old_rev,
            id,
        } => commands::jobs::enqueue(
            &config,
            commands::jobs::EnqueueArgs {
                name,
                kind,
                url,
                rev,
                old_rev,
                id,
            },
        )?,
        Commands::Job { job_id } => commands::jobs::show(&config, &job_id)?,
        Commands::Jobs {
            repo,
            status,
            limit,
        } => commands::jobs::list(&config, repo.as_deref(), status.as_deref(), limit)?,
        Commands::Search {
            name,
            query,
            mode,
            glob,
            lang,
            case_sensitive,
            r#ref,
            limit,
        } => commands::search::run(
            &config,
            commands::search::SearchArgs {
                name: &name,
                query: &query,
                mode: &mode,
                glob: glob.as_deref(),
                lang: lang.as_deref(),
                case_sensitive,
                reference: r#ref.as_deref(),
                limit,
            },
        )?,
        Commands::Log {
            name,
            r#ref,
            offset,
            limit,
        } => commands::repo::log(&config, &name, r#ref.as_deref(), offset, limit)?,
        Commands::Stats { name } => commands::repo::stats(&config, &name)?,
        Commands::Repos => commands::repo::list(&config)?,
        Commands::Cleanup => commands::jobs::cleanup(&config)?,
        Commands::Serve { bind, port } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            commands::serve::run(config)?;
        }
    }

    Ok(())
}
