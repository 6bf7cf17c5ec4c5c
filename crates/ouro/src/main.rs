//! ouro: recursive language model runner
//!
//! Runs a root agent on a query, letting the model work through the input in
//! a persistent REPL and delegate sub-problems to spawned sub-agents. Every
//! invocation writes a JSONL event log that `ouro log` can render as a tree.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::Config;
use ouro_engine::Rlm;
use ouro_trace::{EventLog, RunTree};

/// Recursive language model runner
#[derive(Parser)]
#[command(name = "ouro")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a .ouro directory (default: search upward from the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// The query for the root agent
    query: Option<String>,

    /// Prefix for the run's log file name
    #[arg(long)]
    prefix: Option<String>,

    /// Override the root agent's model
    #[arg(long)]
    model: Option<String>,

    /// Override the sub-agent model
    #[arg(long)]
    sub_model: Option<String>,

    /// Override the maximum recursion depth
    #[arg(long)]
    max_depth: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .ouro directory with a config file
    Init {
        /// Force overwrite of an existing config
        #[arg(long)]
        force: bool,
    },

    /// Render the run tree of a JSONL event log
    Log {
        /// Path to the log file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Some(Commands::Init { force }) => init(*force),
        Some(Commands::Log { file }) => render_log(file),
        None => {
            let Some(query) = cli.query.clone() else {
                bail!("no query given; run `ouro \"your question\"` or see `ouro --help`");
            };
            run(&cli, &query).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<(Config, Option<PathBuf>)> {
    if let Some(dir) = &cli.config {
        let path = dir.join(config::CONFIG_FILE);
        let loaded = Config::from_file(&path)?;
        return Ok((loaded, Some(dir.clone())));
    }

    let cwd = std::env::current_dir()?;
    match Config::find_and_load_from(&cwd)? {
        Some((loaded, ouro_dir)) => {
            tracing::debug!(dir = %ouro_dir.display(), "loaded config");
            Ok((loaded, Some(ouro_dir)))
        }
        None => Ok((Config::default(), None)),
    }
}

async fn run(cli: &Cli, query: &str) -> Result<()> {
    let (config, ouro_dir) = load_config(cli)?;

    let mut rlm_config = config.to_rlm_config();
    if let Some(model) = &cli.model {
        rlm_config.primary_model = model.clone();
    }
    if let Some(model) = &cli.sub_model {
        rlm_config.sub_model = model.clone();
    }
    if let Some(depth) = cli.max_depth {
        rlm_config.max_depth = depth;
    }

    let log_dir = config.resolve_log_dir(ouro_dir.as_deref());
    let rlm = Rlm::from_env(rlm_config)
        .context("failed to initialize the LLM client")?
        .with_log_dir(log_dir);

    let outcome = rlm
        .run_with_prefix(query, cli.prefix.as_deref())
        .await
        .context("run aborted")?;

    println!("{}", outcome.results);
    eprintln!();
    eprintln!("log:    {}", outcome.log_file.display());
    eprintln!(
        "usage:  {} prompt + {} completion tokens, ${:.4}",
        outcome.usage.prompt_tokens, outcome.usage.completion_tokens, outcome.usage.cost
    );
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let ouro_dir = PathBuf::from(config::OURO_DIR);
    let config_path = ouro_dir.join(config::CONFIG_FILE);

    if config_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }

    std::fs::create_dir_all(&ouro_dir)?;
    std::fs::write(&config_path, config::default_config_toml())?;
    println!("wrote {}", config_path.display());
    Ok(())
}

fn render_log(file: &Path) -> Result<()> {
    let events = EventLog::read(file)
        .with_context(|| format!("failed to read log file: {}", file.display()))?;
    let tree = RunTree::from_events(&events);
    if tree.is_empty() {
        println!("(no runs in log)");
        return Ok(());
    }
    print!("{}", tree.render());
    Ok(())
}
