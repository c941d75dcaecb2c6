/*!
 * Faultline CLI
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use faultline::{
    config::{EngineConfig, LogLevel, RuleSet},
    logging,
    processor::RuleProcessor,
    retry::ResolutionRetryPolicy,
    rules::{ConnectionType, FaultInjectionResult},
    Resolvers, StaticTopology,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "faultline")]
#[command(
    version,
    about = "Validate and plan client-side fault injection rules",
    long_about = None
)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Verbose logging (shorthand for --log-level debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a rule file
    Validate {
        /// Rule file (TOML)
        rules: PathBuf,
    },

    /// Resolve every rule of a file against a static topology and print the effective rules
    Plan {
        /// Rule file (TOML)
        rules: PathBuf,

        /// Topology file (TOML)
        #[arg(short = 't', long = "topology", value_name = "FILE")]
        topology: PathBuf,

        /// Container the rules target
        #[arg(long = "container", value_name = "NAME")]
        container: String,

        /// Override the connectivity from the engine configuration
        #[arg(long = "connection-mode", value_enum)]
        connection_mode: Option<ConnectionModeArg>,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum ConnectionModeArg {
    Direct,
    Gateway,
}

impl From<ConnectionModeArg> for ConnectionType {
    fn from(arg: ConnectionModeArg) -> Self {
        match arg {
            ConnectionModeArg::Direct => ConnectionType::Direct,
            ConnectionModeArg::Gateway => ConnectionType::Gateway,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    config.logging.verbose |= cli.verbose;
    logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Validate { rules } => validate(&rules),
        Commands::Plan {
            rules,
            topology,
            container,
            connection_mode,
        } => {
            if let Some(mode) = connection_mode {
                config.connection_mode = mode.into();
            }
            plan(&config, &rules, &topology, &container)
        }
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let rules = RuleSet::from_file(path)?.to_rules()?;
    println!("{}: {} rule(s) OK", path.display(), rules.len());
    for rule in &rules {
        let kind = match rule.result() {
            FaultInjectionResult::ServerError(result) => result.kind().to_string(),
            FaultInjectionResult::ConnectionError(result) => result.kind().to_string(),
        };
        println!(
            "  {} [{}] {}{}",
            rule.id(),
            rule.condition().connection_type(),
            kind,
            if rule.is_enabled() { "" } else { " (disabled)" }
        );
    }
    Ok(())
}

fn plan(
    config: &EngineConfig,
    rules: &Path,
    topology: &Path,
    container: &str,
) -> anyhow::Result<()> {
    let rules = RuleSet::from_file(rules)?.to_rules()?;
    let topology = Arc::new(StaticTopology::from_file(topology)?);
    let processor = RuleProcessor::new(
        config.connection_mode,
        Resolvers::from_single(topology),
        ResolutionRetryPolicy::new(config.resolution_retry.clone()),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;

    let summaries = runtime.block_on(async {
        let mut summaries = Vec::with_capacity(rules.len());
        for rule in &rules {
            let effective = processor
                .process(rule, container)
                .await
                .with_context(|| format!("Failed to process rule {}", rule.id()))?;
            summaries.push(effective.summary());
        }
        Ok::<_, anyhow::Error>(summaries)
    })?;

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
