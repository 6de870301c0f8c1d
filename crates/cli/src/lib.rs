pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use assay_core::config::{AssayConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "assay",
    about = "Assay operator CLI",
    long_about = "Answer queries with calibrated confidence, inspect configuration, and check \
                  calibration quality.",
    after_help = "Examples:\n  assay ask \"How does TLS resumption work?\" --corpus docs.json\n  \
                  assay config\n  assay calibration --config assay.toml"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Read configuration from FILE")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, value_name = "FORMAT", help = "Override logging.format")]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a query from a JSON corpus and print the delivered result")]
    Ask(AskArgs),
    #[command(about = "Print the effective configuration as JSON with source attribution")]
    Config,
    #[command(about = "Report ECE and Brier score before and after calibration")]
    Calibration,
}

#[derive(Clone, Debug, Default, Args)]
pub struct AskArgs {
    /// The question to answer.
    pub query: String,
    #[arg(long, value_name = "FILE", help = "JSON array of documents to search")]
    pub corpus: Option<PathBuf>,
    #[arg(long, help = "Emit the full execution result as JSON")]
    pub json: bool,
    #[arg(long, help = "Override orchestrator.max_attempts")]
    pub max_attempts: Option<u32>,
    #[arg(long, value_name = "METHOD", help = "Override calibration.method")]
    pub calibration_method: Option<String>,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        let mut overrides = ConfigOverrides {
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            ..ConfigOverrides::default()
        };
        if let Command::Ask(args) = &self.command {
            overrides.max_attempts = args.max_attempts;
            overrides.calibration_method = args.calibration_method.clone();
        }

        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides,
        }
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Ask(_) => "ask",
            Self::Config => "config",
            Self::Calibration => "calibration",
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match AssayConfig::load(cli.load_options()) {
        Ok(config) => {
            init_logging(&config.logging);
            match &cli.command {
                Command::Ask(args) => commands::ask::run(&config, args),
                Command::Config => commands::config::run(&config, cli.config.as_deref()),
                Command::Calibration => commands::calibration::run(&config),
            }
        }
        Err(error) => CommandResult::failure(
            cli.command.name(),
            "config_validation",
            error.to_string(),
            commands::EXIT_CONFIG,
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Logs go to stderr so stdout carries only
/// command output. `RUST_LOG`, when set, takes precedence over the level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "cli.logging.already_initialized", "subscriber already set");
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn ask_flags_become_config_overrides() {
        let cli = Cli::parse_from([
            "assay",
            "ask",
            "what is entropy?",
            "--max-attempts",
            "5",
            "--calibration-method",
            "platt",
            "--config",
            "assay.toml",
        ]);

        let options = cli.load_options();
        assert!(options.require_file);
        assert_eq!(options.overrides.max_attempts, Some(5));
        assert_eq!(options.overrides.calibration_method.as_deref(), Some("platt"));
        assert!(matches!(cli.command, Command::Ask(ref args) if args.query == "what is entropy?"));
    }

    #[test]
    fn config_file_is_optional_without_flag() {
        let cli = Cli::parse_from(["assay", "config"]);
        let options = cli.load_options();

        assert!(!options.require_file);
        assert!(options.config_path.is_none());
        assert_eq!(cli.command.name(), "config");
    }
}
