//! Main binary for the fleet worker sidecar daemon (fleetd)

use clap::{Parser, Subcommand};
use fleetd_agent::{init_agent, AgentConfig, Result};
use tracing::error;

#[derive(Parser)]
#[command(name = "fleetd")]
#[command(about = "Fleet worker sidecar: metrics, readiness and registration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log level override
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (default)
    Run,
    /// Print the effective configuration as JSON
    Config,
    /// Validate the configuration read from the environment
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AgentConfig::from_env();
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(config).await,
        Commands::Config => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                Ok(())
            }
            Err(e) => {
                eprintln!("Configuration is invalid: {}", e);
                std::process::exit(1);
            }
        },
    }
}

async fn run_agent(config: AgentConfig) -> Result<()> {
    let mut agent = init_agent(&config).await?;

    if let Err(e) = agent.run().await {
        error!("agent exited with error: {}", e);
        return Err(e);
    }

    Ok(())
}
