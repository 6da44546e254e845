use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use starmirror::github::resolve_username;
use starmirror::health::CheckResult;
use starmirror::{
    ApiClient, CloneOutcome, Config, Credentials, ErrorPolicy, HealthCheck, Ledger, LocalMirror,
    RepositorySource, SyncEngine, SyncSummary, WikiOutcome,
};

#[derive(Parser)]
#[command(name = "starmirror")]
#[command(about = "Mirror your starred GitHub repositories to disk, organised by language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Mirror root directory (overrides root_directory)
    #[arg(short, long)]
    root: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror every starred repository (default)
    Sync(SyncArgs),

    /// List starred repositories without mirroring
    List {
        /// Show repository details
        #[arg(long)]
        details: bool,

        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// User whose stars are listed
        #[arg(long, env = "GITHUB_USERNAME")]
        username: Option<String>,

        /// Stop after this many API pages
        #[arg(long)]
        api_pages: Option<u32>,
    },

    /// Show ledger entries and whether each mirror is still on disk
    Ledger,

    /// System health check and diagnostics
    Doctor {
        /// GitHub token to check instead of the detected one
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Parser, Debug, Default)]
struct SyncArgs {
    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User whose stars are mirrored
    #[arg(long, env = "GITHUB_USERNAME")]
    username: Option<String>,

    /// Stop after this many API pages
    #[arg(long)]
    api_pages: Option<u32>,

    /// Abort the whole run on the first git failure
    #[arg(long, conflicts_with = "errbreak")]
    errexit: bool,

    /// Stop after the repository where a git failure happened
    #[arg(long)]
    errbreak: bool,

    /// Do not mirror wikis
    #[arg(long)]
    no_wiki: bool,

    /// History depth for fresh clones
    #[arg(long, conflicts_with = "full")]
    depth: Option<u32>,

    /// Clone full history
    #[arg(long)]
    full: bool,
}

impl SyncArgs {
    fn apply(&self, config: &mut Config) {
        if self.errexit {
            config.sync.error_policy = ErrorPolicy::Exit;
        } else if self.errbreak {
            config.sync.error_policy = ErrorPolicy::Break;
        }
        if self.no_wiki {
            config.sync.mirror_wikis = false;
        }
        if self.full {
            config.sync.clone_depth = None;
        } else if let Some(depth) = self.depth {
            config.sync.clone_depth = Some(depth.max(1));
        }
        if self.api_pages.is_some() {
            config.github.max_pages = self.api_pages;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config)?;
    if let Some(root) = cli.root {
        config.root_directory = root;
    }

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting starmirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None => cmd_sync(SyncArgs::try_parse_from(["starmirror"])?, config).await,
        Some(Commands::Sync(args)) => cmd_sync(args, config).await,
        Some(Commands::List {
            details,
            token,
            username,
            api_pages,
        }) => {
            if api_pages.is_some() {
                config.github.max_pages = api_pages;
            }
            cmd_list(details, token, username, &config).await
        }
        Some(Commands::Ledger) => cmd_ledger(&config),
        Some(Commands::Doctor { token }) => cmd_doctor(&config, token.as_deref()),
    }
}

/// Initialize logging: RUST_LOG, then --verbose, then the configured level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

async fn connect(
    config: &Config,
    token: Option<&str>,
    username: Option<&str>,
) -> Result<(ApiClient, String)> {
    let credentials = Credentials::detect(config, token)?;
    info!("Using authentication strategy: {:?}", credentials.strategy);

    let username = resolve_username(config, &credentials, username).await?;
    let api = ApiClient::new(&config.github, credentials.token)?;
    Ok((api, username))
}

/// Mirror every starred repository
async fn cmd_sync(args: SyncArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    let (api, username) = connect(&config, args.token.as_deref(), args.username.as_deref()).await?;
    let engine = SyncEngine::new(&config)?;

    println!("🔍 Mirroring stars of {} into {}", username, engine.root().display());
    let mut pager = api.starred(&username);
    let summary = engine.run(&mut pager, &api).await?;

    if summary.total_repositories == 0 {
        if config.sync.error_policy == ErrorPolicy::Exit {
            bail!("No repositories found or error fetching data.");
        }
        eprintln!("No repositories found or error fetching data.");
        return Ok(());
    }

    print_summary(&summary, pager.truncated());
    Ok(())
}

fn print_summary(summary: &SyncSummary, listing_truncated: bool) {
    if summary.halted {
        println!(
            "\n⏹️  Stopped early after a failure in {}",
            summary.halted_on.as_deref().unwrap_or("unknown repository")
        );
    } else if listing_truncated {
        println!("\n⚠️  Starred listing ended early, some repositories were not processed");
    } else {
        println!("\n🎉 All repositories processed!");
    }
    println!("   📊 Total repositories: {}", summary.total_repositories);
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   🔄 Updated: {}", summary.already_present);
    println!("   ❌ Clone failures: {}", summary.transfer_failed);
    println!("   🔧 Repair failures: {}", summary.repair_failed);
    println!("   ⏭️  Left alone: {}", summary.left_alone);
    println!("   📚 Wikis cloned: {}", summary.wikis_cloned);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    let problems: Vec<_> = summary
        .reports
        .iter()
        .filter(|r| {
            matches!(
                r.outcome,
                CloneOutcome::TransferFailed | CloneOutcome::RepairFailed | CloneOutcome::LeftAlone
            ) || r.wiki == Some(WikiOutcome::Failed)
        })
        .collect();

    if !problems.is_empty() {
        println!("\n🔍 Needs attention:");
        for report in problems {
            println!("   {} ({:?}, wiki: {:?})", report.full_name, report.outcome, report.wiki);
        }
    }
}

/// List starred repositories without touching the disk
async fn cmd_list(
    details: bool,
    token: Option<String>,
    username: Option<String>,
    config: &Config,
) -> Result<()> {
    let (api, username) = connect(config, token.as_deref(), username.as_deref()).await?;
    let root = config.root_path()?;
    let mut pager = api.starred(&username);

    let mut count = 0;
    while let Some(page) = pager.next_page().await? {
        for repo in page {
            count += 1;
            if details {
                let local = LocalMirror::new(&root, &repo);
                println!("📁 {}", repo.full_name);
                println!("   🔗 {}", repo.clone_url);
                println!("   🏷️  Language: {}", repo.language_dir());
                println!("   📊 Size: {} KB", repo.size_kb);
                match repo.has_wiki {
                    Some(true) => println!("   📚 Wiki: enabled"),
                    Some(false) => println!("   📚 Wiki: none"),
                    None => {}
                }
                println!(
                    "   💾 {} ({})",
                    local.path.display(),
                    if local.has_marker() { "mirrored" } else { "not mirrored" }
                );
                println!();
            } else {
                println!("  📁 {}", repo.full_name);
            }
        }
    }

    if count == 0 {
        eprintln!("No repositories found or error fetching data.");
    } else {
        println!("Starred repositories: {}", count);
    }
    if pager.truncated() {
        eprintln!("Starred listing ended early; the list above is incomplete.");
    }
    Ok(())
}

/// Print ledger entries with their on-disk state
fn cmd_ledger(config: &Config) -> Result<()> {
    let root = config.root_path()?;
    let ledger = Ledger::new(config.ledger_path()?);
    let entries = ledger.load()?;

    println!("Ledger {} ({} entries)", ledger.path().display(), entries.len());
    for entry in entries {
        match Ledger::locate(&root, &entry) {
            Some(path) => println!("  ✅ {} → {}", entry, path.display()),
            None => println!("  ⚠️  {} (no mirror on disk)", entry),
        }
    }
    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config, token: Option<&str>) -> Result<()> {
    let health = HealthCheck::run(config, token);
    print_health_report(&health);
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 starmirror System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    let warnings = health.warnings().len();
    if health.all_passed() {
        if warnings == 0 {
            println!("✅ All checks passed");
        } else {
            println!("✅ All checks passed ({} warnings)", warnings);
        }
    } else {
        println!(
            "❌ {} checks failed, {} warnings",
            health.errors().len(),
            warnings
        );
    }
}
