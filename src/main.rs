mod api;
mod client;
mod commands;
mod config;
mod domain;
mod server;
mod upstream;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vmwatch",
    version,
    about = "VM backup reporting and reachability monitoring"
)]
struct Cli {
    /// Path to config file (default: ~/.config/vmwatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output format (table or json)
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the vmwatch daemon (REST + GraphQL)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Backup inventory reports
    Backups {
        /// Fetch upstream directly instead of asking a local daemon
        #[arg(long)]
        direct: bool,

        #[command(subcommand)]
        command: commands::backups::BackupsCommands,
    },

    /// Reconciled VM view with status and severity
    Vms {
        #[arg(long)]
        direct: bool,

        #[command(flatten)]
        args: commands::vms::VmsArgs,
    },

    /// Status transition history for a day
    History {
        #[arg(long)]
        direct: bool,

        #[command(flatten)]
        args: commands::history::HistoryArgs,
    },

    /// Check whether one address is reachable
    Ping {
        /// Address to check
        ip: String,
    },

    /// Ping every VM in the inventory
    Sweep {
        #[command(flatten)]
        args: commands::sweep::SweepArgs,
    },

    /// Manage VM master records
    Inventory {
        #[command(subcommand)]
        command: commands::inventory::InventoryCommands,
    },

    /// Query a vmwatch daemon's REST API
    Query {
        /// Target node name (from config nodes map; defaults to localhost)
        #[arg(long, global = true)]
        node: Option<String>,

        #[command(subcommand)]
        command: commands::query::QueryCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let format = cli.format.as_str();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
        } => commands::daemon::run(http_addr, log_level, config),
        Commands::Backups { direct, command } => {
            commands::backups::run(config, format, direct, &command)
        }
        Commands::Vms { direct, args } => commands::vms::run(config, format, direct, &args),
        Commands::History { direct, args } => {
            commands::history::run(config, format, direct, &args)
        }
        Commands::Ping { ip } => commands::ping::run(config, format, &ip),
        Commands::Sweep { args } => commands::sweep::run(config, format, &args),
        Commands::Inventory { command } => commands::inventory::run(config, format, &command),
        Commands::Query { node, command } => {
            commands::query::run(config, node.as_deref(), format, &command)
        }
    }
}
