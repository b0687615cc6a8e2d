//! qpilot Command-Line Interface
//!
//! Inspect the converter graph, convert circuit files and run them through
//! the dispatcher on the local simulator or on QMware.
//!
//! ```text
//! qpilot formats
//! qpilot path QASM3 QUIL
//! qpilot transpile -i bell.qasm --to QUIL
//! qpilot run -i bell.qasm -i ghz.qasm --device local-sim --shots 2000
//! qpilot providers
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use qpilot_sched::Config;

mod commands;

use commands::{formats, path, providers, run, transpile};

/// qpilot - quantum job orchestration across formats and providers
#[derive(Parser)]
#[command(name = "qpilot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "QPILOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known formats and converters
    Formats,

    /// Show the cheapest conversion chain between two formats
    Path {
        /// Source format
        from: String,

        /// Target format
        to: String,

        /// Skip converters marked unsafe
        #[arg(long)]
        safe_only: bool,
    },

    /// Convert a circuit file into another format
    Transpile {
        /// Input file (.qasm, .qasm3, .json, .py)
        #[arg(short, long)]
        input: PathBuf,

        /// Source language, detected from the extension if omitted
        #[arg(short, long)]
        language: Option<String>,

        /// Target format
        #[arg(short, long)]
        to: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run circuit files as one job
    Run {
        /// Input files, one program each
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Device to run on
        #[arg(short, long, default_value = qpilot_pilot_sim::DEVICE)]
        device: String,

        /// Number of shots
        #[arg(short, long, default_value = "1024")]
        shots: u32,

        /// Job type
        #[arg(long, value_enum, default_value = "runner")]
        job_type: run::JobKind,

        /// Provider token (overrides the configured one)
        #[arg(long, env = "QPILOT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List providers and devices the pilots offer
    Providers,
}

fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(2);
        }
    };
    init_logging(cli.verbose, &config);

    let result = match cli.command {
        Commands::Formats => formats::execute(),

        Commands::Path { from, to, safe_only } => path::execute(&from, &to, safe_only),

        Commands::Transpile {
            input,
            language,
            to,
            output,
        } => transpile::execute(
            &config,
            &input,
            language.as_deref(),
            &to,
            output.as_deref(),
        ),

        Commands::Run {
            input,
            device,
            shots,
            job_type,
            token,
            json,
        } => {
            run::execute(
                &config,
                &run::RunArgs {
                    inputs: input,
                    device,
                    shots,
                    job_type,
                    token,
                    json,
                },
            )
            .await
        }

        Commands::Providers => providers::execute(&config).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
