use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentpulse", version, about = "AgentPulse telemetry collector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and WebSocket fan-out server
    Serve,

    /// Print the dashboard summary
    Summary {
        /// Window size in hours
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },

    /// Print the 7-day cost table
    Costs,

    /// Print the model rate table used for cost attribution
    Rates,

    /// Manage tracked sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Delete every recorded session, command, usage row, process and event
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Mark a session completed
    End {
        /// The session identifier
        id: String,
    },
}
