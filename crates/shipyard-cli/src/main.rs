use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shipyard",
    about = "Shipyard: zero-downtime image rollouts for ECS services",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Point services at new image tags and wait for them to stabilize.
    ///
    /// The backend service is always updated. The frontend service is
    /// updated afterwards, only if --frontend-service is given and the
    /// backend rollout succeeded.
    ///
    /// Rolling back is the same command with the previous tag.
    Deploy(commands::deploy::DeployArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("shipyard=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Deploy(args) => commands::deploy::deploy(args).await,
    }
}
