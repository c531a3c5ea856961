//! wpadvisory-sync command-line tool.
//!
//! Reads the Wordfence vulnerability feed and opens one pull request per
//! advisory that adds a `conflict` constraint to a site's `composer.json`.
//! `plan` shows what a run would change without touching the repository.

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wpadvisory_sync_core::config::AppConfig;
use wpadvisory_sync_core::feed::{FeedSource, FileFeedSource, WordfenceClient};
use wpadvisory_sync_core::git::{GitHubClient, GitHubGateway};
use wpadvisory_sync_core::{ChangeOrchestrator, OrchestratorSettings, RunReport};

const CONFIG_FILE_NAME: &str = "wpadvisory-sync.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Keep a composer conflict list in step with the Wordfence feed.
#[derive(Parser, Debug)]
#[command(name = "wpadvisory-sync", version)]
struct Cli {
    /// Path to the TOML configuration file. Without it, `./wpadvisory-sync.toml`
    /// and the user config directory are tried, then the environment alone.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process the feed and open a pull request per changed entry.
    Run {
        /// Print the run report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show what a run would change, without writing to the repository.
    Plan {
        /// Write each candidate manifest to this directory as `<branch>.json`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./wpadvisory-sync.toml")]
        output: PathBuf,
    },

    /// Validate the configuration.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(cli.config.as_deref()),
        Commands::Run { json } => {
            let (config, source) = load_config(cli.config.as_deref())?;
            init_tracing(cli.log_level.as_deref(), &config);
            log_startup(&config, &source);
            cmd_run(&config, json).await
        }
        Commands::Plan { output, json } => {
            let (config, source) = load_config(cli.config.as_deref())?;
            init_tracing(cli.log_level.as_deref(), &config);
            log_startup(&config, &source);
            cmd_plan(&config, output.as_deref(), json).await
        }
    }
}

/// Level from the flag, else `RUST_LOG`, else the config.
fn init_tracing(flag: Option<&str>, config: &AppConfig) {
    let filter = match flag {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.run.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn log_startup(config: &AppConfig, source: &str) {
    info!("wpadvisory-sync v{}", env!("CARGO_PKG_VERSION"));
    info!("Config        : {}", source);
    info!("Repository    : {}", config.github.upstream());
    if let Some(fork) = config.github.fork() {
        info!("Fork          : {}", fork);
    }
    info!("Base branch   : {}", config.github.default_branch);
    info!("Manifest      : {}", config.github.manifest_path);
    match &config.feed.file {
        Some(path) => info!("Feed          : {}", path.display()),
        None => info!("Feed          : {} ({})", config.feed.effective_url(), config.feed.kind),
    }
    info!("Pause         : {}s", config.run.pause_secs);
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Candidate config files tried when `--config` is not given.
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("wpadvisory-sync").join("config.toml"));
    }
    paths
}

/// Load, resolve and validate the configuration. Also returns where it came from.
fn load_config(path: Option<&Path>) -> Result<(AppConfig, String)> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| default_config_paths().into_iter().find(|p| p.exists()));

    match path {
        Some(path) => {
            let config = AppConfig::load_and_resolve(&path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            Ok((config, path.display().to_string()))
        }
        None => {
            let config =
                AppConfig::from_env().context("failed to read configuration from environment")?;
            config
                .validate()
                .context("configuration validation failed")?;
            Ok((config, "environment".to_string()))
        }
    }
}

fn feed_source(config: &AppConfig) -> Box<dyn FeedSource> {
    match &config.feed.file {
        Some(path) => Box::new(FileFeedSource::new(path)),
        None => Box::new(WordfenceClient::with_url(config.feed.effective_url())),
    }
}

fn orchestrator(
    config: &AppConfig,
) -> Result<ChangeOrchestrator<GitHubGateway, Box<dyn FeedSource>>> {
    let token = config.require_token()?;
    let client = GitHubClient::new(&config.github.api_url, token)
        .context("failed to create GitHub client")?;
    let gateway = GitHubGateway::new(
        client,
        config.github.upstream(),
        config.github.fork(),
        &config.github.default_branch,
    );
    Ok(ChangeOrchestrator::new(
        gateway,
        feed_source(config),
        OrchestratorSettings::from(config),
    ))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, json: bool) -> Result<()> {
    let report = orchestrator(config)?
        .run()
        .await
        .context("run aborted")?;
    print_report(&report, json, false)
}

async fn cmd_plan(config: &AppConfig, output: Option<&Path>, json: bool) -> Result<()> {
    let report = orchestrator(config)?
        .plan(output)
        .await
        .context("plan aborted")?;
    print_report(&report, json, true)
}

fn print_report(report: &RunReport, json: bool, plan: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report).context("failed to encode report")?;
        println!("{out}");
    } else {
        report::print(report, plan);
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, AppConfig::default_template()).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Set the repository owner and name under [github]");
    println!("  2. Export the access token: export BOT_PERSONAL_ACCESS_TOKEN=...");
    println!(
        "  3. Validate with: wpadvisory-sync validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview changes: wpadvisory-sync plan --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let (mut config, source) = match config_path {
        Some(path) => {
            println!("Validating configuration: {}", path.display());
            println!();
            let config =
                AppConfig::load_from_file(path).context("failed to parse configuration")?;
            println!("  [OK] TOML structure is valid");
            (config, path.display().to_string())
        }
        None => {
            println!("Validating configuration from environment");
            println!();
            let config = AppConfig::from_env().context("failed to read environment")?;
            println!("  [OK] Required environment variables are set");
            (config, "environment".to_string())
        }
    };

    if config_path.is_some() {
        config
            .resolve_env_vars()
            .context("failed to resolve environment variables")?;
        println!("  [OK] Environment variable references processed");
    }

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary ({source}):");
    println!("  Repository    : {}", config.github.upstream());
    println!(
        "  Fork          : {}",
        config
            .github
            .fork()
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Base branch   : {}", config.github.default_branch);
    println!("  Manifest      : {}", config.github.manifest_path);
    println!(
        "  Token         : {}",
        if config.github.token.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    match &config.feed.file {
        Some(path) => println!("  Feed          : {}", path.display()),
        None => println!("  Feed          : {}", config.feed.effective_url()),
    }
    println!("  Pause         : {}s", config.run.pause_secs);
    println!("  Enabled       : {}", config.run.enabled);

    Ok(())
}
