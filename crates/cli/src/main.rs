// Taskpool CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Pool settings come from TASKPOOL_* env (and .env), flags override.

mod commands;
mod output;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use taskpool::PoolConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "taskpool")]
#[command(about = "Taskpool CLI - Drive an adaptive task pool and watch it scale")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(
        long,
        short,
        global = true,
        env = "TASKPOOL_OUTPUT",
        default_value = "text",
        value_parser = ["text", "json", "yaml"]
    )]
    pub output: String,

    /// Suppress periodic snapshots
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub pool: PoolArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides applied on top of the environment configuration
#[derive(Args, Debug, Default)]
pub struct PoolArgs {
    /// Pool name used in log events
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Permanent workers
    #[arg(long, global = true)]
    pub init_workers: Option<usize>,

    /// Queue capacity
    #[arg(long, global = true)]
    pub queue_capacity: Option<usize>,

    /// Upper bound of the idle-evicted band
    #[arg(long, global = true)]
    pub core_workers: Option<usize>,

    /// Upper bound of the fast-exit band
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Idle time before core workers exit, in milliseconds
    #[arg(long, global = true)]
    pub max_idle_ms: Option<u64>,

    /// Default submission deadline, in milliseconds
    #[arg(long, global = true)]
    pub submit_timeout_ms: Option<u64>,

    /// Error handler timeout, in milliseconds
    #[arg(long, global = true)]
    pub err_handle_timeout_ms: Option<u64>,

    /// Queue occupancy ratio (0.0 - 1.0) that triggers scaling
    #[arg(long, global = true)]
    pub queue_backlog_rate: Option<f64>,
}

impl PoolArgs {
    fn apply(&self, mut config: PoolConfig) -> PoolConfig {
        if let Some(name) = &self.name {
            config = config.with_name(name.clone());
        }
        if let Some(init) = self.init_workers {
            config.init_workers = init;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(core) = self.core_workers {
            config = config.with_core_workers(core);
        }
        if let Some(max) = self.max_workers {
            config = config.with_max_workers(max);
        }
        if let Some(ms) = self.max_idle_ms {
            config = config.with_max_idle_time(Duration::from_millis(ms));
        }
        if let Some(ms) = self.submit_timeout_ms {
            config = config.with_submit_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.err_handle_timeout_ms {
            config = config.with_err_handle_timeout(Duration::from_millis(ms));
        }
        if let Some(rate) = self.queue_backlog_rate {
            config = config.with_queue_backlog_rate(rate);
        }
        config
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit synthetic tasks and stream pool snapshots
    Run(commands::run::RunArgs),

    /// Print the resolved pool configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpool=info,taskpool_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded .env from {:?}", path);
    }

    let cli = Cli::parse();
    let output_format = output::OutputFormat::parse(&cli.output);
    let config = cli.pool.apply(PoolConfig::from_env()?);

    match cli.command {
        Commands::Run(args) => commands::run::run(config, args, output_format, cli.quiet).await,
        Commands::Config => commands::config::run(&config, output_format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::run::ShutdownMode;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "taskpool",
            "--init-workers",
            "4",
            "--max-workers",
            "12",
            "--max-idle-ms",
            "250",
            "config",
        ])
        .unwrap();

        let config = cli.pool.apply(PoolConfig::new(1, 32).with_name("base"));
        assert_eq!(config.name, "base");
        assert_eq!(config.init_workers, 4);
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.max_workers, Some(12));
        assert_eq!(config.max_idle_time, Duration::from_millis(250));
    }

    #[test]
    fn test_run_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "taskpool", "run", "--tasks", "50", "--mode", "now", "--queue-capacity", "8",
        ])
        .unwrap();

        assert_eq!(cli.pool.queue_capacity, Some(8));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.tasks, 50);
                assert_eq!(args.mode, ShutdownMode::Now);
            }
            Commands::Config => panic!("expected run command"),
        }
    }
}
