//! AppointSync - Cross-language synchronization for appointment products
//!
//! Command line front end: replays host lifecycle events against a JSON
//! state file so the synchronization engine can be driven and inspected
//! outside the host platform.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use appointsync::cli::{Args, Commands};
use appointsync::config::Config;
use appointsync::hooks::{Collaborators, Integration};
use appointsync::model::{Language, LinkedTable, MetaValue, RecordId};
use appointsync::reader::CallerContext;
use appointsync::store::{MetadataStore, Snapshot};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    info!("Starting AppointSync");

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try appointsync.toml in the current directory first
            if std::path::Path::new("appointsync.toml").exists() {
                info!("Found appointsync.toml in current directory, loading...");
                Config::from_file("appointsync.toml")?
            } else {
                Config::default()
            }
        }
    };

    let parts = Snapshot::load(&args.state)?.into_parts()?;
    let integration = Integration::new(
        config,
        Collaborators {
            registry: &parts.registry,
            meta: &parts.meta,
            linked: &parts.linked,
            content: &parts.content,
        },
    )?;

    run(&integration, &args.command)?;

    if args.command.is_mutating() {
        Snapshot::from_parts(&parts.registry, &parts.meta, &parts.linked, &parts.content).save(&args.state)?;
        info!("State saved to {}", args.state.display());
    }

    Ok(())
}

fn run(integration: &Integration<'_>, command: &Commands) -> Result<()> {
    match command {
        Commands::CopyProduct { from, to, lang } => {
            let language = Language::parse(lang)?;
            let report = integration.on_product_copied(RecordId(*from), RecordId(*to), &language)?;

            println!(
                "Staff: {} inserted, {} updated, {} unchanged",
                report.relationships.inserted, report.relationships.updated, report.relationships.unchanged
            );
            println!(
                "Availability: {} inserted, {} updated, {} unchanged",
                report.availability.inserted, report.availability.updated, report.availability.unchanged
            );
            println!("Metadata keys copied: {}", report.metas_copied);
        }

        Commands::Reconcile { table, source, target } => {
            let table: LinkedTable = table.parse()?;
            let report = integration.reconcile(table, RecordId(*source), RecordId(*target))?;
            println!(
                "{}: {} inserted, {} updated, {} unchanged",
                table, report.inserted, report.updated, report.unchanged
            );
        }

        Commands::SetMeta { owner, key, value } => {
            let meta = integration.metadata(CallerContext::Admin);
            meta.update(RecordId(*owner), key, parse_value(value), None)?;

            let stored = meta.get(RecordId(*owner), key)?;
            println!("{} = {}", key, serde_json::to_string(&stored)?);
        }

        Commands::GetMeta { owner, key, visitor } => {
            let context = if *visitor {
                CallerContext::Visitor
            } else {
                CallerContext::Admin
            };
            let meta = integration.metadata(context);
            let owner = RecordId(*owner);

            match key {
                Some(key) => match meta.get_single(owner, key)? {
                    Some(value) => println!("{} = {}", key, value),
                    None => println!("{} is not set on {}", key, owner),
                },
                None => {
                    let all = meta.get_all(owner)?;
                    if all.is_empty() {
                        println!("No metadata on {}", owner);
                    }
                    for (key, values) in all {
                        println!("{:<40} {}", key, serde_json::to_string(&values)?);
                    }
                }
            }
        }

        Commands::RemoveStaff { product, staff } => {
            let removed = integration.on_staff_removed(RecordId(*product), RecordId(*staff))?;
            println!("Removed {} row(s) from translations of {}", removed, product);
        }

        Commands::TranslationSaved { post } => {
            let updated = integration.on_translation_saved(RecordId(*post))?;
            println!("{} record(s) now reference {}", updated, post);
        }

        Commands::NewAppointment { id } => match integration.on_new_appointment(RecordId(*id))? {
            Some(language) => println!("Appointment {} set to '{}'", id, language),
            None => println!("Appointment {} left without a language", id),
        },

        Commands::Transition { id, from, to } => {
            if integration.on_status_transition(RecordId(*id), from, to)? {
                println!("Appointment {} switched to the current language", id);
            } else {
                println!("Appointment {} unchanged", id);
            }
        }

        Commands::InitConfig { output } => {
            integration.config().save_to_file(output)?;
            println!("Configuration written to {}", output.display());
        }
    }

    Ok(())
}

/// JSON when the input parses as JSON, a plain string otherwise
fn parse_value(raw: &str) -> MetaValue {
    serde_json::from_str(raw).unwrap_or_else(|_| MetaValue::String(raw.to_string()))
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".appointsync").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "appointsync.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
