//! Tether CLI - traffic manager installation and intercepts

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use commands::GlobalArgs;
use error::Result;

#[derive(Parser)]
#[command(name = "tether")]
#[command(author = "Tether Contributors")]
#[command(version)]
#[command(about = "Route cluster traffic to your machine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the traffic manager release in the cluster
    Helm {
        #[command(subcommand)]
        command: HelmCommands,
    },

    /// Intercept a workload and redirect its traffic to this machine
    Intercept {
        /// Intercept name
        name: String,

        /// Workload to intercept (defaults to the intercept name)
        #[arg(short, long)]
        workload: Option<String>,

        /// Local port that receives the traffic
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Command to run while the intercept is active; the intercept is
        /// removed when it exits
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Remove an intercept
    Leave {
        /// Intercept name
        name: String,
    },

    /// List the intercepts of the current session
    List,
}

#[derive(Subcommand)]
enum HelmCommands {
    /// Install the traffic manager
    Install {
        #[command(flatten)]
        values: ValueArgs,

        /// Install the CRD release instead of the traffic manager
        #[arg(long)]
        crds: bool,
    },

    /// Upgrade the traffic manager
    Upgrade {
        #[command(flatten)]
        values: ValueArgs,

        /// Install the CRD release instead of the traffic manager
        #[arg(long)]
        crds: bool,

        /// Reset values to the bundle defaults
        #[arg(long)]
        reset_values: bool,

        /// Reuse the values of the previous revision
        #[arg(long, conflicts_with = "reset_values")]
        reuse_values: bool,
    },

    /// Uninstall the traffic manager
    Uninstall {
        /// Fail when there is nothing to uninstall
        #[arg(long)]
        strict: bool,

        /// Uninstall the CRD release instead of the traffic manager
        #[arg(long)]
        crds: bool,
    },
}

#[derive(Args)]
struct ValueArgs {
    /// Set values on command line (key=value)
    #[arg(long = "set")]
    set: Vec<String>,

    /// Value overrides as a JSON object
    #[arg(long)]
    values_json: Option<String>,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    let config = global.load_config()?;

    match cli.command {
        Commands::Helm { command } => match command {
            HelmCommands::Install { values, crds } => {
                commands::helm::install(&global, &config, &values.set, values.values_json.as_deref(), crds)
                    .await
            }
            HelmCommands::Upgrade {
                values,
                crds,
                reset_values,
                reuse_values,
            } => {
                commands::helm::upgrade(
                    &global,
                    &config,
                    &values.set,
                    values.values_json.as_deref(),
                    crds,
                    reset_values,
                    reuse_values,
                )
                .await
            }
            HelmCommands::Uninstall { strict, crds } => {
                commands::helm::uninstall(&global, &config, strict, crds).await
            }
        },

        Commands::Intercept {
            name,
            workload,
            port,
            command,
        } => {
            commands::intercept::run(&global, &config, &name, workload.as_deref(), port, &command)
                .await
        }

        Commands::Leave { name } => commands::leave::run(&global, &config, &name).await,

        Commands::List => commands::list::run(&global, &config).await,
    }
}
