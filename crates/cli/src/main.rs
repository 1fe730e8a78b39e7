//! authorchat CLI entry point.
//!
//! Commands:
//! - `serve`     - Start the Twilio webhook gateway
//! - `chat`      - Talk with an author in the terminal
//! - `ask`       - Ask an author a single question
//! - `provision` - Add authors and their books
//! - `config`    - Show, locate or print default configuration
//! - `doctor`    - Diagnose configuration and storage

use std::path::PathBuf;

use authorchat_config::{AppConfig, LoggingConfig};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "authorchat",
    about = "authorchat - talk with an author through their books",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true, env = "AUTHORCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Chat with an author interactively
    Chat {
        /// Author name or contact
        #[arg(short, long)]
        author: Option<String>,

        /// Your identifier in the conversation
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Ask an author one question and print the reply
    Ask {
        /// The question
        question: String,

        /// Author name or contact
        #[arg(short, long)]
        author: Option<String>,

        /// Your identifier in the conversation
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Add authors and books to the store
    #[command(subcommand)]
    Provision(commands::provision::ProvisionCommand),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Diagnose configuration and storage
    Doctor,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Print a config file with every default filled in
    Default,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| format!("Failed to load config: {e}"));
    // Doctor reports a broken config instead of refusing to start
    let config = match (&cli.command, config) {
        (_, Ok(config)) => config,
        (Commands::Doctor, Err(e)) => {
            init_logging(&LoggingConfig::default(), cli.verbose);
            return commands::doctor::run(cli.config.as_deref(), Err(e)).await;
        }
        (_, Err(e)) => return Err(e.into()),
    };

    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config, port, host).await?,
        Commands::Chat { author, user } => commands::chat::run(config, author, user).await?,
        Commands::Ask { question, author, user } => {
            commands::ask::run(config, author, user, question).await?
        }
        Commands::Provision(command) => commands::provision::run(config, command).await?,
        Commands::Config(ConfigCommand::Show) => commands::config_cmd::show(&config)?,
        Commands::Config(ConfigCommand::Path) => commands::config_cmd::path(cli.config.as_deref()),
        Commands::Config(ConfigCommand::Default) => commands::config_cmd::default(),
        Commands::Doctor => commands::doctor::run(cli.config.as_deref(), Ok(config)).await?,
    }

    Ok(())
}
