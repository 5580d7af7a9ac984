//! objattr CLI: attribute adjectives to objects from the command line or over HTTP.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// objattr: which adjective describes which object?
#[derive(Parser, Debug)]
#[command(name = "objattr", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Attribution strategy: syntactic, attention, llm (overrides config)
    #[arg(short, long, global = true, value_parser = ["syntactic", "attention", "llm"])]
    attributor: Option<String>,

    /// CoNLL-U file with pre-tagged sentences (syntactic and attention strategies)
    #[arg(long, global = true)]
    tagged: Option<PathBuf>,

    /// JSON-lines file with exported attention tensors (attention strategy)
    #[arg(long, global = true)]
    attentions: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Attribute adjectives to objects in a single text
    Extract {
        /// Input text
        text: String,
    },
    /// Show adjective/noun attention weights for a text
    Weights {
        /// Input text
        text: String,
    },
    /// Run the batched LLM strategy over a corpus (one text per line)
    Corpus {
        /// Input file, one text per line
        input: PathBuf,
        /// Append each parsed result to this log as `text~json`
        #[arg(long)]
        persist: Option<PathBuf>,
        /// Skip texts already present in the persist log
        #[arg(long, requires = "persist")]
        resume: bool,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print dependency-derived reference labels for a CoNLL-U file
    Reference {
        /// CoNLL-U file
        input: PathBuf,
        /// Skip sentences without any adjective
        #[arg(long)]
        only_with_adjectives: bool,
    },
    /// Ask a running HTTP front to attribute a text
    Remote {
        /// Input text
        text: String,
        /// Base URL of the front (defaults to the configured host and port)
        #[arg(long)]
        url: Option<String>,
    },
    /// Serve the HTTP front
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file to the user config directory
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "objattr", "objattr")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "objattr.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let inputs = commands::Inputs {
        config: cli.config,
        attributor: cli.attributor,
        tagged: cli.tagged,
        attentions: cli.attentions,
    };
    commands::handle_command(cli.command, &inputs).await
}
