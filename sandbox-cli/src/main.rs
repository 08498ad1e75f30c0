//! # sandbox CLI
//!
//! Command-line interface for the component sandbox.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sandbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = sandbox_host::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter sandbox.yml and App.jsx
    Init {
        /// Target directory (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Execute a component file once and print the mounted HTML
    Render {
        /// Component source file
        file: PathBuf,

        /// Print the whole page, error panel included
        #[arg(long)]
        page: bool,
    },

    /// Run the execution runtime over stdin/stdout JSON lines
    Frame,

    /// Re-execute a component file whenever it changes
    Watch {
        /// Component source file (defaults to `source` from the config)
        file: Option<PathBuf>,

        /// Run the runtime on a thread instead of a child process
        #[arg(long)]
        in_process: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => commands::init_project(path.as_deref()),
        Commands::Render { file, page } => commands::render_file(&cli.config, &file, page),
        Commands::Frame => commands::serve_frame(&cli.config).await,
        Commands::Watch { file, in_process } => {
            let opts = commands::WatchOptions {
                file,
                in_process,
                verbose: cli.verbose,
            };
            commands::watch_file(&cli.config, opts).await
        }
    }
}
