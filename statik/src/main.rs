//! Statik - static asset server in front of ASGI, RSGI and WSGI applications
//!
//! This is the main entry point for the Statik CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use statik_core::config::{
    ConfigLoader, GatewayKind, MountConfig, RuntimeMode, ServerConfig, StaticFilesConfig, StatikConfig,
};
use statik_files::StaticFiles;

/// Statik - serve static files ahead of your application
#[derive(Parser)]
#[command(name = "statik")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server with a configuration file
    Run {
        /// Path to the configuration file (TOML or JSON)
        #[arg(default_value = "statik.toml")]
        config: PathBuf,
    },

    /// Serve one directory without a configuration file
    Serve {
        /// Directory to serve
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// URL prefix to mount the directory at
        #[arg(long, default_value = "/static")]
        prefix: String,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: String,

        /// Gateway shape for the application behind the mount
        #[arg(long, default_value_t)]
        gateway: GatewayKind,

        /// Execution mode
        #[arg(long, default_value_t)]
        mode: RuntimeMode,

        /// Cache-Control value for served files
        #[arg(long)]
        cache_control: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "statik.toml")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config: config_path } => {
            let config = ConfigLoader::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?;
            init_tracing(&config.logging.level, cli.verbose);
            tracing::info!("Starting Statik with config: {}", config_path.display());

            statik_gateway::run(&config)?;
        }

        Commands::Serve {
            root,
            prefix,
            listen,
            gateway,
            mode,
            cache_control,
        } => {
            let mut static_files = StaticFilesConfig {
                mounts: vec![MountConfig { prefix, root }],
                ..Default::default()
            };
            if let Some(cache_control) = cache_control {
                static_files.cache_control = cache_control;
            }
            let config = StatikConfig {
                server: ServerConfig {
                    listen,
                    gateway,
                    mode,
                    ..Default::default()
                },
                static_files,
                ..Default::default()
            };
            config.validate()?;
            init_tracing(&config.logging.level, cli.verbose);
            tracing::info!("📁 Serving {} at {}", config.static_files.mounts[0].root.display(), config.static_files.mounts[0].prefix);

            statik_gateway::run(&config)?;
        }

        Commands::Validate { config: config_path } => {
            init_tracing("warn", cli.verbose);
            let result = ConfigLoader::load(&config_path)
                .and_then(|config| StaticFiles::new(&config.static_files, config.server.mode).map(|_| config));

            match result {
                Ok(config) => {
                    println!("✅ Configuration is valid");
                    println!("   Gateway: {}", config.server.gateway);
                    println!("   Mode: {}", config.server.mode);
                    for mount in &config.static_files.mounts {
                        println!("   Mount: {} -> {}", mount.prefix, mount.root.display());
                    }
                }
                Err(e) => {
                    eprintln!("❌ Configuration error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Statik v{}", statik_core::VERSION);
            println!("Static asset server for ASGI, RSGI and WSGI applications");
        }
    }

    Ok(())
}
