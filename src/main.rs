use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use sqlvault::cli::{handle_backup_command, BackupCommands};
use sqlvault::config::{BackupConfig, ConfigArgs};
use sqlvault::error::{VaultError, EXIT_FAILURE, EXIT_USAGE};

#[derive(Parser)]
#[command(
    name = "sqlvault",
    version,
    about = "Compressed, checksummed database dumps and restores",
    long_about = "sqlvault dumps a database server through a compressor straight into a \
                  dated archive with a SHA-256 checksum, and restores the newest (or a \
                  given) archive back. Every option can be set through the environment, \
                  so it runs unchanged from cron or a container."
)]
struct Cli {
    /// Enable debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Backup(BackupCommands),

    /// Show the resolved configuration
    Config,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<VaultError>()
                .map(VaultError::exit_code)
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let needs_server = matches!(&cli.command, Commands::Backup(cmd) if cmd.needs_server());
    let config = if needs_server {
        cli.config.resolve()
    } else {
        cli.config.resolve_local()
    }
    .context("Invalid configuration")?;

    match cli.command {
        Commands::Backup(cmd) => handle_backup_command(&config, cmd)?,
        Commands::Config => print_config(&config),
    }

    Ok(())
}

fn print_config(config: &BackupConfig) {
    println!("sqlvault Configuration");
    println!("======================");
    println!("Server:       {}:{}", config.host, config.port);
    println!(
        "User:         {}",
        if config.user.is_empty() {
            "(not set)"
        } else {
            config.user.as_str()
        }
    );
    println!(
        "Password:     {}",
        if config.password.is_some() {
            "[REDACTED]"
        } else {
            "(not set)"
        }
    );
    println!("Databases:    {}", config.databases);
    println!("Backup dir:   {}", config.backup_dir.display());
    println!("Prefix:       {}", config.prefix);
    println!("Date format:  {}", config.date_format);
    println!(
        "Compression:  {} (level: {}, threads: {})",
        config.compression,
        config
            .compression_level
            .map_or_else(|| "default".to_string(), |l| l.to_string()),
        config
            .compression_threads
            .map_or_else(|| "default".to_string(), |t| t.to_string()),
    );
    println!("Checksum:     {}", if config.checksum { "on" } else { "off" });
    println!(
        "Owner:        {}:{}",
        config
            .ownership
            .uid
            .map_or_else(|| "-".to_string(), |u| u.to_string()),
        config
            .ownership
            .gid
            .map_or_else(|| "-".to_string(), |g| g.to_string()),
    );
    println!(
        "Mode:         {}",
        config
            .mode
            .map_or_else(|| "-".to_string(), |m| format!("{:04o}", m))
    );
    println!("Dump tool:    {} {}", config.dump_command, config.dump_options.join(" "));
    println!("Restore tool: {}", config.restore_command);
}
