//! dsarchive - dataset archiver
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use dsarchive::config::{
    require_catalog, split_member, BuildConfig, CliArgs, Command, PackConfig, RecordConfig,
    RegisterConfig,
};
use dsarchive::coordinator::{run_build, run_record, run_register, PackCoordinator};
use dsarchive::db::Catalog;
use dsarchive::error::ArchiverError;
use dsarchive::progress::{print_header, print_summary, ProgressReporter};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Pack and build runs also log to a dated file next to their output
    let log_dir = match &args.command {
        Command::Pack { output, .. } => Some(output.clone()),
        Command::Build { output, .. } => output.clone(),
        _ => None,
    };
    setup_logging(args.verbose, log_dir.as_deref())?;

    match args.command {
        Command::Init => cmd_init(&args),
        Command::AddUser { ref logname, user_id } => cmd_add_user(&args, logname, user_id),
        Command::Register { .. } => cmd_register(&args),
        Command::Pack { .. } => cmd_pack(&args),
        Command::Build { .. } => cmd_build(&args),
        Command::Record { .. } => cmd_record(&args),
        Command::Locate { ref member } => cmd_locate(&args, member),
    }
}

fn cmd_init(args: &CliArgs) -> Result<()> {
    let path = require_catalog(args, "init")?;
    Catalog::create(&path).with_context(|| format!("Failed to create catalog {}", path.display()))?;
    println!("Catalog ready: {}", path.display());
    Ok(())
}

fn cmd_add_user(args: &CliArgs, logname: &str, user_id: i64) -> Result<()> {
    let path = require_catalog(args, "add-user")?;
    let catalog = Catalog::open(&path)?;
    catalog.add_user(logname, user_id)?;
    println!("User {} -> {}", logname, user_id);
    Ok(())
}

fn cmd_register(args: &CliArgs) -> Result<()> {
    let Some(config) = RegisterConfig::from_args(args) else {
        bail!("not a register command");
    };
    let config = config.context("Invalid configuration")?;

    let report = run_register(&config).context("Registration failed")?;
    println!(
        "Registered {} dataset(s), {} missing, {} unreadable entries",
        report.datasets, report.datasets_missing, report.files_unreadable
    );
    Ok(())
}

fn cmd_pack(args: &CliArgs) -> Result<()> {
    let Some(config) = PackConfig::from_args(args) else {
        bail!("not a pack command");
    };
    let config = config.context("Invalid configuration")?;
    let show_progress = config.show_progress;
    let output = config.output_dir.display().to_string();

    if show_progress {
        let source = match config.inputs.input_file {
            Some(ref file) => file.display().to_string(),
            None => config.inputs.entries.join(" "),
        };
        let mode = if config.deferred { "pack (deferred)" } else { "pack" };
        print_header(mode, &source, &output);
    }

    let coordinator = PackCoordinator::new(config);
    install_shutdown_handler(coordinator.shutdown_flag())?;

    let progress = show_progress.then(ProgressReporter::new);
    let result = coordinator.run(progress.as_ref()).context("Packing failed")?;

    if let Some(ref p) = progress {
        p.finish(if result.completed { "Packing completed" } else { "Packing interrupted" });
    }
    if show_progress {
        print_summary("Packing Complete", &result.report, result.duration, &output);
    }

    finish_run(result.completed, result.report.batches_failed)
}

fn cmd_build(args: &CliArgs) -> Result<()> {
    let Some(config) = BuildConfig::from_args(args) else {
        bail!("not a build command");
    };
    let config = config.context("Invalid configuration")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(Arc::clone(&shutdown))?;

    let progress = (!args.quiet).then(ProgressReporter::new);
    let result = run_build(&config, &shutdown, progress.as_ref()).context("Build failed")?;

    if let Some(ref p) = progress {
        p.finish(if result.completed { "Build completed" } else { "Build interrupted" });
        let output = config
            .output_dir
            .as_deref()
            .map_or_else(|| "next to manifests".to_string(), |d| d.display().to_string());
        print_summary("Build Complete", &result.report, result.duration, &output);
    }

    finish_run(result.completed, result.report.batches_failed)
}

fn cmd_record(args: &CliArgs) -> Result<()> {
    let Some(config) = RecordConfig::from_args(args) else {
        bail!("not a record command");
    };
    let config = config.context("Invalid configuration")?;

    let report = run_record(&config).context("Recording failed")?;
    println!(
        "Recorded {} archive(s), {} association(s) updated",
        report.archives_recorded, report.associations_updated
    );
    if report.catalog_failures > 0 {
        bail!("{} listing(s) could not be recorded", report.catalog_failures);
    }
    Ok(())
}

fn cmd_locate(args: &CliArgs, member: &str) -> Result<()> {
    let path = require_catalog(args, "locate")?;
    let (dataset, relative) = split_member(member)?;
    let catalog = Catalog::open(&path)?;

    match catalog.locate(dataset, relative)? {
        Some(location) => println!("{}\t{}", member, location.name),
        None => println!("{}\tnot archived", member),
    }
    Ok(())
}

fn finish_run(completed: bool, batches_failed: u64) -> Result<()> {
    if !completed {
        info!("Run was interrupted before completion");
        return Err(ArchiverError::Interrupted.into());
    }
    if batches_failed > 0 {
        bail!("{} batch(es) failed", batches_failed);
    }
    Ok(())
}

fn install_shutdown_handler(flag: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing current archive...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")
}

fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("dsarchive=debug,warn")
    } else {
        EnvFilter::new("dsarchive=info,warn")
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let file_layer = match log_dir {
        Some(dir) => {
            let path = log_file_path(dir);
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// `archivelog_YYYYMMDD.log` in the output directory
fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("archivelog_{}.log", Local::now().format("%Y%m%d")))
}
