// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use grameen::catalog::{rehydrate, CatalogFilter, CatalogProvider, DiscoveryOutcome, SeedCatalog};
use grameen::config::{self, PortalConfig};
use grameen::download::{DownloadManager, DownloadStatus, ProgressStore, ResourceItem, WriteThrough};
use grameen::error::{explain_rejection, format_simple_error, ErrorBuilder, Rejection};
use grameen::types::{Language, ResourceCategory};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Data error - unknown resource id or unusable listing
    pub const DATA_ERR: i32 = 65;
    /// Internal software error - download worker stopped
    pub const SOFTWARE: i32 = 70;
    /// I/O error - store or config file could not be used
    pub const IO_ERR: i32 = 74;
    /// Permission denied - no user signed in
    pub const NO_PERM: i32 = 77;
    /// Configuration error - invalid config file
    pub const CONFIG: i32 = 78;
    /// Interrupted by Ctrl+C (128 + SIGINT)
    pub const INTERRUPTED: i32 = 130;
}

use exit_codes::*;

/// Grameen - community services, available offline.
#[derive(Parser)]
#[command(name = "grameen")]
#[command(version = VERSION)]
#[command(about = "Community services catalog with offline downloads.")]
#[command(long_about = "Grameen - community services catalog\n\n\
    Browse resources:    grameen catalog\n\
    Save for offline:    grameen download 1 --user asha\n\
    Remove a download:   grameen remove 1 --user asha\n\
    Stored progress:     grameen progress --user asha\n\
    Configure:           grameen config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog language: en, hi, te, ta or ml
    #[arg(short = 'l', long, global = true, value_parser = parse_language)]
    lang: Option<Language>,

    /// User identity (signs in for this command)
    #[arg(short = 'u', long, global = true)]
    user: Option<String>,

    /// Directory of the progress store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose mode: debug logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List resources with their download state
    ///
    /// Examples:
    ///   grameen catalog
    ///   grameen catalog --search loan --category finance
    ///   grameen catalog --downloaded --user asha
    Catalog {
        /// Only resources whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Only resources of this category
        #[arg(short, long, value_parser = parse_category)]
        category: Option<ResourceCategory>,
        /// Only downloaded resources
        #[arg(short, long)]
        downloaded: bool,
    },

    /// Download a resource for offline use (Ctrl+C cancels)
    Download {
        /// Resource id, as shown by `grameen catalog`
        id: String,
    },

    /// Remove a downloaded resource
    Remove {
        /// Resource id
        id: String,
    },

    /// Show stored progress records
    Progress,

    /// Parse a discovery listing and show the resources found
    Discover {
        /// File holding the listing text
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
}

fn parse_language(value: &str) -> Result<Language, String> {
    value.parse()
}

fn parse_category(value: &str) -> Result<ResourceCategory, String> {
    value.parse()
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "grameen=debug" } else { "grameen=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file, then environment, then command line flags.
fn effective_config(cli: &Cli) -> Result<PortalConfig> {
    let mut config = PortalConfig::load()?;
    if let Some(language) = cli.lang {
        config.language = language;
    }
    if let Some(user) = &cli.user {
        let user = user.trim();
        config.user = (!user.is_empty()).then(|| user.to_string());
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn open_store(config: &PortalConfig) -> Result<ProgressStore> {
    Ok(ProgressStore::open(config.resolved_data_dir()?))
}

/// Manager signed in as the configured user.
async fn open_manager(config: &PortalConfig) -> Result<(DownloadManager, ProgressStore)> {
    let store = open_store(config)?;
    let manager = DownloadManager::new(store.clone(), config.tick_settings());
    manager
        .switch_session(config.language, config.user.clone())
        .await?;
    Ok((manager, store))
}

fn rejection_exit_code(rejection: &Rejection) -> i32 {
    match rejection {
        Rejection::AuthenticationRequired => NO_PERM,
        Rejection::UnknownResource(_) => DATA_ERR,
        Rejection::AlreadyDownloading(_) | Rejection::AlreadyDownloaded(_) => ERROR,
        Rejection::WorkerStopped => SOFTWARE,
    }
}

fn status_marker(status: DownloadStatus) -> String {
    match status {
        DownloadStatus::Downloaded => "[✓]".green().to_string(),
        DownloadStatus::Downloading => "[↓]".yellow().to_string(),
        DownloadStatus::Idle => "[ ]".dimmed().to_string(),
    }
}

fn print_resource(item: &ResourceItem) {
    let offline = if item.offline_available {
        " offline".cyan().to_string()
    } else {
        String::new()
    };
    println!(
        "  {} {:<4} {} {}{}",
        status_marker(item.status),
        item.id.bright_white(),
        item.title.bold(),
        format!("({})", item.category).bright_black(),
        offline
    );
    println!("           {}", item.description.dimmed());
    if let Some(link) = &item.link {
        println!("           {}", link.blue());
    }
}

fn report_write(write: &WriteThrough) {
    match write {
        WriteThrough::Persisted | WriteThrough::NotRequired => {}
        WriteThrough::NoIdentity => {
            println!("{} Not signed in, nothing was saved", "[!]".yellow());
        }
        WriteThrough::Failed { reason } => {
            eprintln!("{} Could not save progress: {}", "[!]".yellow(), reason);
        }
    }
}

fn handle_catalog(
    config: &PortalConfig,
    search: Option<String>,
    category: Option<ResourceCategory>,
    downloaded: bool,
) -> Result<i32> {
    let base = SeedCatalog.resources(config.language);
    let resources = match &config.user {
        Some(user) => rehydrate(base, &open_store(config)?.get(user)),
        None => base,
    };

    let mut filter = CatalogFilter::default().downloaded_only(downloaded);
    if let Some(text) = search {
        filter = filter.search(text);
    }
    if let Some(category) = category {
        filter = filter.category(category);
    }
    let shown = filter.apply(&resources);

    println!();
    println!(
        "{}",
        format!("=== Resources ({}) ===", config.language.native_name())
            .bright_cyan()
            .bold()
    );
    println!();
    if shown.is_empty() {
        println!("  {}", "No resources match".dimmed());
    }
    for item in &shown {
        print_resource(item);
    }
    println!();

    let counts = grameen::download::StatusCounts::tally(&resources);
    println!(
        "{} of {} resources downloaded",
        counts.downloaded.to_string().green(),
        counts.total()
    );
    if config.user.is_none() {
        println!("{}", "Sign in with --user to see your downloads".dimmed());
    }
    Ok(SUCCESS)
}

fn download_bar(title: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")?
            .progress_chars("█▓░"),
    );
    pb.set_message(title.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

enum DownloadEnd {
    Finished(Option<ResourceItem>),
    Interrupted,
}

async fn handle_download(config: &PortalConfig, id: &str) -> Result<i32> {
    let (manager, store) = open_manager(config).await?;

    let mut handle = match manager.start(id).await {
        Ok(handle) => handle,
        Err(rejection) => {
            eprint!("{}", explain_rejection(&rejection));
            return Ok(rejection_exit_code(&rejection));
        }
    };
    let title = handle.progress().map(|r| r.title).unwrap_or_else(|| id.to_string());
    let pb = download_bar(&title)?;

    let end = loop {
        tokio::select! {
            update = handle.next_update() => match update {
                Some(item) if item.status == DownloadStatus::Downloading => {
                    pb.set_position(u64::from(item.progress));
                }
                other => break DownloadEnd::Finished(other),
            },
            _ = tokio::signal::ctrl_c() => break DownloadEnd::Interrupted,
        }
    };

    let code = match end {
        DownloadEnd::Finished(Some(item)) if item.status == DownloadStatus::Downloaded => {
            pb.set_position(100);
            pb.finish_and_clear();
            println!("{} {} is available offline", "[✓]".green(), item.title.bold());
            let saved = config
                .user
                .as_deref()
                .and_then(|user| store.get(user).remove(id))
                .is_some_and(|record| record.status == DownloadStatus::Downloaded);
            if !saved {
                eprintln!(
                    "{} Progress was not saved; it will be lost on the next start",
                    "[!]".yellow()
                );
            }
            SUCCESS
        }
        DownloadEnd::Finished(_) => {
            pb.finish_and_clear();
            eprintln!("{}", format_simple_error("Download stopped before completing"));
            SOFTWARE
        }
        DownloadEnd::Interrupted => {
            pb.finish_and_clear();
            match manager.cancel(id).await {
                Some(transition) => {
                    println!("{} Download of {} cancelled", "[!]".yellow(), title);
                    report_write(&transition.write);
                }
                None => println!("{} Download already finished", "[!]".yellow()),
            }
            INTERRUPTED
        }
    };

    manager.shutdown().await?;
    Ok(code)
}

async fn handle_remove(config: &PortalConfig, id: &str) -> Result<i32> {
    let (manager, _store) = open_manager(config).await?;
    let before = manager.get_progress(id);

    let code = match manager.remove(id).await {
        Some(transition) => {
            let title = before.map(|r| r.title).unwrap_or_else(|| id.to_string());
            println!("{} Removed offline copy of {}", "[✓]".green(), title.bold());
            report_write(&transition.write);
            SUCCESS
        }
        None => match before {
            None => {
                let rejection = Rejection::UnknownResource(id.to_string());
                eprint!("{}", explain_rejection(&rejection));
                DATA_ERR
            }
            Some(_) if config.user.is_none() => {
                let rejection = Rejection::AuthenticationRequired;
                eprint!("{}", explain_rejection(&rejection));
                NO_PERM
            }
            Some(item) => {
                eprintln!(
                    "{}",
                    format_simple_error(&format!("{} is not downloaded", item.title))
                );
                ERROR
            }
        },
    };

    manager.shutdown().await?;
    Ok(code)
}

fn handle_progress(config: &PortalConfig) -> Result<i32> {
    let store = open_store(config)?;

    let Some(user) = config.user.as_deref() else {
        let users = store.users();
        if users.is_empty() {
            println!("No stored progress yet.");
        } else {
            println!("Users with stored progress:");
            for user in users {
                println!("  {}", user.bright_white());
            }
            println!();
            println!("{}", "Show one with: grameen progress --user <NAME>".dimmed());
        }
        return Ok(SUCCESS);
    };

    let mut records: Vec<_> = store.get(user).into_values().collect();
    records.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));

    println!();
    println!("{}", format!("=== Progress for {} ===", user).bright_cyan().bold());
    println!();
    if records.is_empty() {
        println!("  {}", "Nothing downloaded yet".dimmed());
    }
    for record in &records {
        println!(
            "  {} {:<24} {:>3}%",
            status_marker(record.status),
            record.resource_id,
            record.progress
        );
    }
    println!();
    Ok(SUCCESS)
}

fn handle_discover(file: &Path) -> Result<i32> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read listing {}", file.display()))?;

    match grameen::catalog::parse_listing(&text) {
        DiscoveryOutcome::Found(items) => {
            println!();
            println!("{}", "=== Discovered resources ===".bright_cyan().bold());
            println!();
            for item in &items {
                print_resource(item);
            }
            println!();
            println!("{} resources found", items.len().to_string().green());
            Ok(SUCCESS)
        }
        DiscoveryOutcome::Failed { reason } => {
            let error = ErrorBuilder::new("No resources found in listing")
                .cause(reason)
                .fix("Separate entries with --- lines")
                .fix("Give every entry a Title: and a Description: line")
                .build();
            eprint!("{}", error);
            Ok(DATA_ERR)
        }
    }
}

fn handle_config(config: &PortalConfig, command: Option<ConfigCommands>) -> Result<i32> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", "=== Grameen Configuration ===".bright_cyan().bold());
            println!();
            println!(
                "  Language:       {} ({})",
                config.language.native_name(),
                config.language.code()
            );
            let user = config
                .user
                .clone()
                .unwrap_or_else(|| "(not signed in)".dimmed().to_string());
            println!("  User:           {}", user);
            println!("  Data dir:       {}", config.resolved_data_dir()?.display());
            println!("  Tick interval:  {}ms", config.tick_interval_ms);
            println!("  Tick increment: {}%", config.tick_increment);
            println!();
            println!("Config file: {}", config::config_path()?.display());
            println!();
        }
        Some(ConfigCommands::Path) => {
            println!("{}", config::config_path()?.display());
        }
    }
    Ok(SUCCESS)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = match effective_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let error = ErrorBuilder::new("Could not load configuration")
                .cause(format!("{:#}", e))
                .fix("Fix or delete ~/.grameen/config.json")
                .build();
            eprint!("{}", error);
            return Ok(CONFIG);
        }
    };
    tracing::debug!(language = %config.language, user = ?config.user, "Configuration loaded");

    match cli.command {
        Commands::Catalog {
            search,
            category,
            downloaded,
        } => handle_catalog(&config, search, category, downloaded),
        Commands::Download { id } => handle_download(&config, &id).await,
        Commands::Remove { id } => handle_remove(&config, &id).await,
        Commands::Progress => handle_progress(&config),
        Commands::Discover { file } => handle_discover(&file),
        Commands::Config { command } => handle_config(&config, command),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_simple_error(&format!("{:#}", e)));
            IO_ERR
        }
    };
    std::process::exit(code);
}
