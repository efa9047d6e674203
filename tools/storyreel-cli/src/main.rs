//! Storyreel CLI: command-line interface for rendering slideshow templates.
//!
//! Usage:
//!   storyreel render [TEMPLATE]      Render a template to video
//!   storyreel validate [TEMPLATE]    Validate a template
//!   storyreel info [TEMPLATE]        Show template information
//!   storyreel compare <A> <B>        Build a difference video
//!   storyreel check                  Check the encoder installation

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use storyreel_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "storyreel",
    about = "Render Ken Burns slideshows from declarative templates",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a slideshow template to video
    Render(commands::render::RenderArgs),

    /// Validate a slideshow template
    Validate {
        /// Template file; the first *.slideshow under the current directory if omitted
        template: Option<PathBuf>,
    },

    /// Show slideshow information
    Info {
        /// Template file; the first *.slideshow under the current directory if omitted
        template: Option<PathBuf>,
    },

    /// Overlay a rendered video on a reference to show differences
    Compare {
        /// Rendered video
        rendered: PathBuf,

        /// Reference video
        reference: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the encoder installation
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    storyreel_common::logging::init_logging(&config.logging);
    tracing::debug!(config = ?config, "Loaded configuration");

    match cli.command {
        Commands::Render(args) => commands::render::run(&config, args).await,
        Commands::Validate { template } => commands::validate::run(template),
        Commands::Info { template } => commands::info::run(template),
        Commands::Compare {
            rendered,
            reference,
            output,
        } => commands::compare::run(&config, rendered, reference, output),
        Commands::Check => commands::check::run(&config),
    }
}
