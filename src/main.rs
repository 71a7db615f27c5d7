//! voxrelay - chat and speech relay for a browser voice bot
//!
//! Forwards conversation history to a hosted chat-completion API and text to
//! a hosted speech API, returning streamed or buffered results.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxrelay::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "voxrelay")]
#[command(about = "Chat and speech relay for a browser voice bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (defaults plus environment if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("voxrelay={},tower_http=info", default_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_key_sources(key_sources: &[(String, KeySource)]) {
    for (key, source) in key_sources {
        match source {
            KeySource::None => tracing::warn!(key = %key, "No key resolved"),
            _ => tracing::info!(key = %key, source = %source, "Key resolved"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            // The log level lives in the config, so peek at it before tracing is up.
            let level = config
                .as_deref()
                .and_then(|path| std::fs::read_to_string(path).ok())
                .and_then(|content| voxrelay::config::RawConfig::parse_str(&content).ok())
                .map(|raw| raw.log_level().to_string())
                .unwrap_or_else(|| "info".to_string());
            init_tracing(&level);

            tracing::info!(config = ?config, "Loading configuration");
            let (mut cfg, key_sources) = Config::load(config.as_deref())?;
            log_key_sources(&key_sources);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                cfg.server.listen = addr;
            }

            voxrelay::proxy::run_server(cfg).await
        }

        Commands::Check { config } => {
            init_tracing("info");
            let (cfg, key_sources) = Config::load(config.as_deref())?;

            println!("Configuration OK");
            println!("  listen:        {}", cfg.server.listen);
            println!("  chat:          {} ({})", cfg.chat.url, cfg.chat.model);
            println!("  speech:        {} ({:?})", cfg.speech.url, cfg.speech.format);
            println!("  cors origins:  {:?}", cfg.cors.allowed_origins);
            println!("  cors patterns: {:?}", cfg.cors.allowed_origin_patterns);
            for (key, source) in &key_sources {
                println!("  {:<22} {}", key, source);
            }
            Ok(())
        }
    }
}
