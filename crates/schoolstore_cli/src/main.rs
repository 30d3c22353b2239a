//! Store check entry point.
//!
//! # Responsibility
//! - Verify `schoolstore_core` wiring against a real or in-memory store.
//! - Print deterministic `key=value` lines for quick local checks.
//!
//! Usage: `schoolstore_cli [--db PATH] [--config PATH] [--provision] [--rollover SESSION]`

use clap::Parser;
use schoolstore_core::{SchoolStore, SessionId, StoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "schoolstore_cli")]
#[command(about = "Checks a school store and optionally provisions or rolls it over")]
struct CliArgs {
    /// Store file; an in-memory store is used when omitted
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// JSON store settings
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Provision every standard table of the active session
    #[arg(short, long)]
    provision: bool,

    /// Roll the store over to this academic session, e.g. 2025-26
    #[arg(short, long, value_name = "SESSION")]
    rollover: Option<String>,
}

fn run(args: CliArgs) -> Result<(), String> {
    let settings = match &args.config {
        Some(path) => StoreConfig::load(path).map_err(|err| err.to_string())?,
        None => StoreConfig::default(),
    };
    let store = match &args.db {
        Some(path) => SchoolStore::open(path, settings),
        None => SchoolStore::open_in_memory(settings),
    }
    .map_err(|err| err.to_string())?;

    println!("schoolstore_core version={}", schoolstore_core::core_version());

    if let Some(raw) = &args.rollover {
        let session = SessionId::parse(raw).map_err(|err| err.to_string())?;
        let report = store.rollover(&session).map_err(|err| err.to_string())?;
        println!(
            "rollover old_session={} new_session={} stage={:?} complete={}",
            report.old_session,
            report.new_session,
            report.stage,
            report.is_complete()
        );
        for entry in &report.masters {
            println!(
                "rollover_master module={} table={} outcome={:?}",
                entry.module, entry.table, entry.outcome
            );
        }
    }

    let ctx = store.current_context().map_err(|err| err.to_string())?;
    println!("active_session={}", ctx.session());

    if args.provision {
        let summary = store
            .provisioning()
            .provision_all(&ctx)
            .map_err(|err| err.to_string())?;
        println!(
            "provision created={} existing={}",
            summary.created.len(),
            summary.existing
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(CliArgs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error={err}");
            ExitCode::FAILURE
        }
    }
}
