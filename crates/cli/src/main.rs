mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rockhopper::Config;

#[derive(Parser)]
#[command(name = "rockhopper")]
#[command(about = "SQL schema migration tool")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true, default_value = "rockhopper.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration scripts to upgrade the database schema
    Up {
        /// Upgrade up to a specific version
        #[arg(long, default_value_t = 0)]
        to: i64,

        /// Run the upgrade by steps
        #[arg(long, default_value_t = 0)]
        steps: usize,
    },

    /// Roll back applied migrations (one step unless --to or --steps is given)
    Down {
        /// Downgrade down to a specific version
        #[arg(long, default_value_t = 0)]
        to: i64,

        /// Run the downgrade by steps
        #[arg(long, default_value_t = 0)]
        steps: usize,
    },

    /// Roll back and re-apply the last applied migration
    Redo,

    /// Show the status of every known migration
    Status,

    /// Migrate the database to a specific version, choosing the direction
    /// automatically
    Align {
        /// Target version
        #[arg(long)]
        to: i64,
    },

    /// Create a new migration script from the template
    Create {
        /// Short description used in the filename
        name: String,
    },

    /// Compile SQL migrations into Rust source files
    Compile {
        /// Output directory for the generated modules
        #[arg(long, default_value = "src/migrations")]
        output: String,
    },
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    if config.driver.is_empty() {
        anyhow::bail!("driver name can not be empty");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Up { to, steps } => {
            check_config(&config)?;
            commands::up::run(&config, to, steps).await
        }
        Commands::Down { to, steps } => {
            check_config(&config)?;
            commands::down::run(&config, to, steps).await
        }
        Commands::Redo => {
            check_config(&config)?;
            commands::redo::run(&config).await
        }
        Commands::Status => {
            check_config(&config)?;
            commands::status::run(&config).await
        }
        Commands::Align { to } => {
            check_config(&config)?;
            commands::align::run(&config, to).await
        }
        Commands::Create { name } => commands::create::run(&config, &name),
        Commands::Compile { output } => commands::compile::run(&config, &output),
    }
}
