//! Command-line entry point.
//!
//! # Responsibility
//! - Load config, initialize logging and build the storage adapter once.
//! - Expose registration, preview and revision-gated update commands.
//! - Print results as JSON on stdout.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use sepuling_core::{
    init_logging, init_stderr_logging, open_repository, AppConfig, PreviewEdge, RegistrationEdge,
    SepulkaClient, SepulkaRepository, SepulkaService, Touch,
};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sepuling", version, about = "Register and inspect sepulkas")]
struct Cli {
    /// TOML config file; built-in defaults when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a new sepulka.
    Register { external_id: String },
    /// List previews matching an external id.
    View { external_id: String },
    /// Look up the internal id registered for an external id.
    Exists { external_id: String },
    /// Show the preview of one internal id.
    Preview { internal_id: Uuid },
    /// Bump the revision if it still equals REVISION.
    Touch { internal_id: Uuid, revision: u32 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config `{}`", path.display()))?,
        None => AppConfig::default(),
    };

    match &config.logging.dir {
        Some(dir) => init_logging(&config.logging.level, dir),
        None => init_stderr_logging(&config.logging.level),
    }
    .map_err(anyhow::Error::msg)
    .context("initializing logging")?;

    let storage = &config.storage;
    let repo = open_repository(storage.mapping.mode, &storage.target()?, storage.pool_options())
        .context("opening storage")?;
    let client = SepulkaClient::new(SepulkaService::new(repo));
    info!(
        "event=cli_command module=cli status=start command={:?}",
        cli.command
    );

    let output = match cli.command {
        Command::Register { external_id } => {
            let reply = client.register(&RegistrationEdge {
                external_id: Some(external_id),
            })?;
            serde_json::to_value(reply)?
        }
        Command::View { external_id } => {
            let replies = client.view(&PreviewEdge {
                external_id: Some(external_id),
            })?;
            serde_json::to_value(replies)?
        }
        Command::Exists { external_id } => {
            let existence = client
                .service()
                .repository()
                .find_by_external_id(&external_id)?;
            serde_json::to_value(existence)?
        }
        Command::Preview { internal_id } => {
            let preview = client
                .service()
                .repository()
                .find_by_internal_id(internal_id)?;
            serde_json::to_value(preview)?
        }
        Command::Touch {
            internal_id,
            revision,
        } => {
            let touch = Touch {
                revision,
                updated_at: Utc::now(),
            };
            client.service().repository().update_by(internal_id, &touch)?;
            serde_json::json!({ "internalId": internal_id, "revision": u64::from(revision) + 1 })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
