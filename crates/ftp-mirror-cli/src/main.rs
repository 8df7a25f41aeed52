mod commands;
mod logging;
mod progress;
mod secrets;

use std::fs;
use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use ftp_mirror_core::config::load_configuration;
use ftp_mirror_core::{ConfigSecretProvider, Error, MirrorConfig, MirrorEngine, SecretProvider};
use progress::{CliReporter, TreePrinter};
use secrets::PromptSecretProvider;
use tracing::{error, info};

const EXIT_CONFIG: i32 = 1;
const EXIT_CONNECTION: i32 = 2;
const EXIT_NODE_ERRORS: i32 = 3;

fn main() {
    dotenv().ok();

    let guard = logging::init_logger();
    let args = Cli::parse();

    let code = match args.command {
        Some(Commands::InitConfig { path, force }) => match init_config(&path, force) {
            Ok(()) => 0,
            Err(err) => {
                error!("{:#}", err);
                EXIT_CONFIG
            }
        },
        Some(command) => match load_configuration(args.config.as_deref()) {
            Ok(config) => run(command, config),
            Err(err) => {
                error!("Error loading configuration: {}", err);
                EXIT_CONFIG
            }
        },
        None => {
            let _ = Cli::command().print_long_help();
            0
        }
    };

    // process::exit skips destructors; flush the file log first.
    drop(guard);
    process::exit(code);
}

fn run(command: Commands, config: MirrorConfig) -> i32 {
    let outcome = match command {
        Commands::Mirror {
            dry_run,
            ask_password,
            fail_on_errors,
        } => run_mirror(&config, dry_run, ask_password, fail_on_errors),
        Commands::List { ask_password } => run_list(&config, ask_password),
        Commands::PrintConfig => print_config(&config),
        Commands::InitConfig { .. } => Ok(0),
    };

    outcome.unwrap_or_else(|err| {
        error!("{:#}", err);
        exit_code_for(&err)
    })
}

fn secret_provider(ask_password: bool) -> Box<dyn SecretProvider> {
    if ask_password {
        Box::new(PromptSecretProvider)
    } else {
        Box::new(ConfigSecretProvider)
    }
}

fn run_mirror(
    config: &MirrorConfig,
    dry_run: bool,
    ask_password: bool,
    fail_on_errors: bool,
) -> anyhow::Result<i32> {
    let engine = MirrorEngine::ftp(config.clone());
    let secrets = secret_provider(ask_password);
    let reporter = CliReporter::new();

    info!(
        "Mirroring {}:{}{} into {}",
        config.host,
        config.port,
        config.remote_base_dir,
        config.local_base_dir.display()
    );
    let result = if dry_run {
        engine.scan(secrets.as_ref(), &reporter)?
    } else {
        engine.mirror(secrets.as_ref(), &reporter)?
    };

    progress::print_summary(&result.report, result.duration, result.dry_run);

    if let Some(csv_path) = &config.report_csv {
        result
            .report
            .write_csv(csv_path)
            .with_context(|| format!("writing report to {}", csv_path.display()))?;
        info!("Report written to {}", csv_path.display());
    }

    if fail_on_errors && result.report.has_errors() {
        return Ok(EXIT_NODE_ERRORS);
    }
    Ok(0)
}

fn run_list(config: &MirrorConfig, ask_password: bool) -> anyhow::Result<i32> {
    let engine = MirrorEngine::ftp(config.clone());
    let secrets = secret_provider(ask_password);
    let result = engine.scan(secrets.as_ref(), &TreePrinter)?;

    println!();
    println!(
        "{} entries, {} errors",
        format!("{}", result.report.entries_listed).cyan(),
        format!("{}", result.report.error_count()).red()
    );
    Ok(0)
}

fn print_config(config: &MirrorConfig) -> anyhow::Result<i32> {
    println!("{}", config.redacted().to_toml()?);
    Ok(0)
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    let text = MirrorConfig::example().to_toml()?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Example configuration written to {}", path.display().to_string().green());
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::Connection(_)) => EXIT_CONNECTION,
        _ => EXIT_CONFIG,
    }
}
