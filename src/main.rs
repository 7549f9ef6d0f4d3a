use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use musicgate::cli::simulate::{parse_units, ScriptedSignal, SimulationPlan};
use musicgate::models::{config::CONFIG_FILE, GateConfig};
use musicgate::{Context, Result};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "musicgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Music gate: start the player, then continue to the main page", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (default: ./musicgate.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the gate page
    Serve {
        /// HTTP port (default: from config, 4567)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open the gate in a browser (requires ui feature)
        #[arg(long)]
        open: bool,
    },

    /// Show the stored decision record
    Status {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Replay a scripted signal timeline against the coordinator
    Simulate {
        /// Signal as <units>:<kind>[=<attribute>], e.g. 1:click, 2:mutation=src
        #[arg(short, long = "signal")]
        signals: Vec<ScriptedSignal>,

        /// Press the manual continue button at this time (units)
        #[arg(long)]
        manual_at: Option<f64>,

        /// Seed a prior decision record this many minutes old
        #[arg(long)]
        prior_age_minutes: Option<u64>,

        /// Simulate until this time (units)
        #[arg(long, default_value = "20", value_parser = parse_units)]
        until: f64,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// Write a default musicgate.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    if let Err(e) = runtime.block_on(run_async(cli)) {
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run_async(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let load_config = || {
        GateConfig::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))
    };

    match cli.command {
        Commands::Serve { port, open } => {
            musicgate::cli::serve::run(load_config()?, port, open).await?;
        }

        Commands::Status { json } => {
            musicgate::cli::status::run(&load_config()?, json).await?;
        }

        Commands::Simulate {
            mut signals,
            manual_at,
            prior_age_minutes,
            until,
            json,
        } => {
            if let Some(at) = manual_at {
                signals.push(format!("{}:manual", at).parse()?);
            }
            let plan = SimulationPlan {
                signals,
                prior_age_minutes,
                until_units: until,
            };
            musicgate::cli::simulate::run(&load_config()?, plan, json).await?;
        }

        Commands::Init { force } => {
            musicgate::cli::init::run(&config_path, force).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "musicgate", &mut io::stdout());
        }
    }

    Ok(())
}
