//! Browsing Agent - LLM-driven web browsing assistant
//!
//! Main entry point: serves the HTTP/WebSocket API or runs one task.

use std::sync::Arc;

use anyhow::Context;
use browsing_agent::agent::{Agent, AgentRole};
use browsing_agent::{server, Config};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Browsing Agent - drives a browser through an LLM tool-calling loop
#[derive(Parser, Debug)]
#[command(name = "browsing-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Oracle model
    #[arg(long, short = 'm', global = true)]
    model: Option<String>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,

    /// Enable debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket API (default)
    Serve,
    /// Run a single task and print the final message
    Run {
        /// The task
        #[arg(long, short = 'p')]
        prompt: String,
        /// Role to run the task as
        #[arg(long, short = 'r')]
        role: Option<AgentRole>,
    },
    /// Print the default configuration file
    Config,
}

fn init_logging(debug: bool) {
    let default = if debug {
        "browsing_agent=debug,tower_http=debug"
    } else {
        "browsing_agent=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Startup order: environment, logging, configuration
    dotenvy::dotenv().ok();
    init_logging(args.debug);

    if let Some(Command::Config) = args.command {
        println!("{}", Config::default_config_toml());
        return Ok(());
    }

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if let Some(ref model) = args.model {
        config.oracle.model = model.clone();
    }

    if args.headless {
        config.browser.headless = true;
    }

    if let Err(e) = config.validate() {
        // Keep running; oracle calls will fail until the key is provided
        error!(error = %e, "configuration incomplete");
    }

    let agent = Arc::new(Agent::from_config(config).context("failed to build agent")?);

    match args.command {
        Some(Command::Run { prompt, role }) => {
            let role = role.unwrap_or(agent.config().agent.role);
            let result = agent.run(&prompt, role).await;
            agent.browser().shutdown().await;

            let outcome = result.context("task failed")?;
            info!(
                turns = outcome.turns,
                tool_dispatches = outcome.tool_dispatches,
                "task finished"
            );
            println!("{}", outcome.final_message);
        }
        _ => server::serve(agent).await.context("server failed")?,
    }

    Ok(())
}
