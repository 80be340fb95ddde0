//! # Smelinx — lifecycle notice dispatcher
//!
//! Sends scheduled deprecation/sunset notices for catalogued APIs and keeps
//! retry state in SQLite.
//!
//! Usage:
//!   smelinx                                   # Run the dispatcher until Ctrl-C
//!   smelinx once                              # One cycle, print the report
//!   smelinx due --limit 20                    # What would be sent right now
//!   smelinx schedule --api A --version V --kind sunset --at 2026-09-01
//!   smelinx cancel <id> --reason "plan changed"
//!   smelinx init-config                       # Write ~/.smelinx/config.toml

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use smelinx_core::SmelinxConfig;
use smelinx_scheduler::{
    BackoffPolicy, DispatchSettings, Dispatcher, NewApi, NotificationKind, NotificationStore,
    NotifyDb, parse_schedule_time,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smelinx", version, about = "📮 Smelinx — API lifecycle notice dispatcher")]
struct Cli {
    /// Config file (default: ~/.smelinx/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// SQLite database path (overrides config and SQLITE_PATH)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic dispatcher until Ctrl-C (default)
    Run,
    /// Run a single dispatch cycle and print its report
    Once,
    /// List notices that are due now, without sending anything
    Due {
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Schedule a notice for an API version
    Schedule {
        #[arg(long)]
        api: String,
        /// Version id
        #[arg(long)]
        version: String,
        /// deprecate | sunset
        #[arg(long)]
        kind: String,
        /// RFC 3339 instant or YYYY-MM-DD (midnight UTC)
        #[arg(long)]
        at: String,
    },
    /// Cancel a pending notice
    Cancel {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show one notice
    Show { id: String },
    /// List every notice of an API
    List {
        #[arg(long)]
        api: String,
    },
    /// Register an organization, API and version (prints their ids)
    AddApi {
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        docs_url: Option<String>,
    },
    /// Write a default config file
    InitConfig {
        #[arg(long)]
        path: Option<String>,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn load_config(cli: &Cli) -> Result<SmelinxConfig> {
    let mut config = match &cli.config {
        Some(path) => SmelinxConfig::load_from(Path::new(&expand_path(path)))?,
        None => SmelinxConfig::load()?,
    };
    config.apply_env_overrides(|k| std::env::var(k).ok());
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &SmelinxConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn open_db(config: &SmelinxConfig) -> Result<Arc<NotifyDb>> {
    let path = expand_path(&config.database.path);
    let db = NotifyDb::open(Path::new(&path))
        .with_context(|| format!("opening database {path}"))?;
    Ok(Arc::new(db))
}

fn dispatcher(config: &SmelinxConfig, db: Arc<NotifyDb>) -> Dispatcher {
    let mailer = smelinx_channels::build_mailer(&config.mailer);
    Dispatcher::new(
        db,
        mailer,
        BackoffPolicy::from_config(&config.notify),
        DispatchSettings::from_config(&config.notify),
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::InitConfig { path }) = &cli.command {
        let path = path
            .as_deref()
            .map(|p| PathBuf::from(expand_path(p)))
            .unwrap_or_else(SmelinxConfig::default_path);
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        SmelinxConfig::default().save_to(&path)?;
        println!("✅ Config written to {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli)?;
    init_logging(&config, cli.verbose);
    let db = open_db(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let handle = Arc::new(dispatcher(&config, db)).spawn();
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down...");
            handle.shutdown().await;
        }
        Command::Once => {
            let report = dispatcher(&config, db).run_cycle().await?;
            print_json(&report)?;
        }
        Command::Due { limit } => {
            print_json(&db.list_due(Utc::now(), limit).await?)?;
        }
        Command::Schedule {
            api,
            version,
            kind,
            at,
        } => {
            let kind: NotificationKind = kind.parse()?;
            let at = parse_schedule_time(&at)?;
            print_json(&db.create(&api, &version, kind, at).await?)?;
        }
        Command::Cancel { id, reason } => {
            print_json(&db.cancel(&id, reason.as_deref()).await?)?;
        }
        Command::Show { id } => {
            print_json(&db.get_by_id(&id).await?)?;
        }
        Command::List { api } => {
            print_json(&db.list_for_api(&api).await?)?;
        }
        Command::AddApi {
            org,
            name,
            version,
            contact,
            base_url,
            docs_url,
        } => {
            let org_id = db.create_organization(&org)?;
            let api_id = db.create_api(&NewApi {
                org_id: org_id.clone(),
                name,
                contact_email: contact,
                base_url,
                docs_url,
                ..Default::default()
            })?;
            let version_id = db.create_version(&api_id, &version)?;
            print_json(&serde_json::json!({
                "org_id": org_id,
                "api_id": api_id,
                "version_id": version_id,
            }))?;
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
