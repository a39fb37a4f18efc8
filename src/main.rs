mod apply;
mod artifacts;
mod collector;
mod config;
mod fabric;
mod inventory;
mod models;
mod ndfc;
mod onboarding;
mod render;
mod stages;
mod utils;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collector::SshConnector;
use config::Config;
use ndfc::NdfcClient;
use stages::{Runner, StageOptions, StageOutcome};

#[derive(Parser)]
#[command(name = "ndfc-migrate")]
#[command(about = "Migrate NX-OS switches into Nexus Dashboard Fabric Controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Ansible-style inventory file
    #[arg(long, global = true)]
    inventory: Option<String>,

    /// Fabric definition file
    #[arg(long, global = true)]
    fabrics: Option<String>,

    /// Directory for generated profiles and retry files
    #[arg(long, global = true)]
    artifacts: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct StageArgs {
    /// Comma-separated hostnames, or @<stage> to re-run that stage's failures
    #[arg(long)]
    limit: Option<String>,

    /// Only touch this fabric
    #[arg(long)]
    fabric: Option<String>,

    /// Report what would be created without creating it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Collect facts from running switches and write profile artifacts
    Profile(StageArgs),
    /// Create missing fabrics
    Fabric(StageArgs),
    /// Pre-provision POAP switches and discover existing ones
    Switches(StageArgs),
    /// Bootstrap pre-provisioned switches waiting in the POAP queue
    Bootstrap(StageArgs),
    /// Create VLAN policies
    Vlans(StageArgs),
    /// Create VPC pairs
    Vpc(StageArgs),
    /// Create interface policies
    Interfaces(StageArgs),
    /// Create feature and static-route policies
    Policies(StageArgs),
    /// Run profile, fabric, switches, vlans, vpc, interfaces and policies in order
    All(StageArgs),
    /// Print each switch's onboarding decision
    Classify(StageArgs),
}

impl Command {
    fn args(&self) -> &StageArgs {
        match self {
            Command::Profile(a)
            | Command::Fabric(a)
            | Command::Switches(a)
            | Command::Bootstrap(a)
            | Command::Vlans(a)
            | Command::Vpc(a)
            | Command::Interfaces(a)
            | Command::Policies(a)
            | Command::All(a)
            | Command::Classify(a) => a,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ndfc_migrate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration; CLI paths win over the environment
    let mut cfg = Config::load();
    if let Some(path) = cli.inventory {
        cfg.inventory_path = path;
    }
    if let Some(path) = cli.fabrics {
        cfg.fabrics_path = path;
    }
    if let Some(dir) = cli.artifacts {
        cfg.artifact_dir = dir;
    }

    let inventory = inventory::load_inventory(&cfg.inventory_path)?;
    tracing::info!("Fabrics in inventory: {}", inventory.fabrics().join(", "));
    let fabrics = if std::path::Path::new(&cfg.fabrics_path).exists() {
        fabric::load_fabrics(&cfg.fabrics_path)?
    } else {
        tracing::warn!("Fabric definition file {} not found", cfg.fabrics_path);
        Vec::new()
    };

    let args = cli.command.args().clone();
    let store = artifacts::ArtifactStore::new(&cfg.artifact_dir);
    let limit = match &args.limit {
        Some(raw) => Some(stages::resolve_limit(raw, &store).await?),
        None => None,
    };
    let opts = StageOptions {
        limit,
        fabric: args.fabric,
        dry_run: args.dry_run,
    };

    let connector = SshConnector {
        default_user: cfg.ssh_user.clone(),
        default_pass: cfg.ssh_pass.clone(),
        timeout_secs: cfg.ssh_timeout_secs,
    };
    let needs_controller = !matches!(cli.command, Command::Profile(_) | Command::Classify(_));
    let client = if needs_controller {
        Some(NdfcClient::connect(&cfg).await?)
    } else {
        None
    };

    let mut runner = Runner::new(cfg, inventory, fabrics, opts);
    let outcome = match (&cli.command, client.as_ref()) {
        (Command::Classify(_), _) => {
            for line in runner.classify() {
                println!("{}", line);
            }
            StageOutcome::default()
        }
        (Command::Profile(_), _) => runner.profile(&connector).await?,
        (Command::Fabric(_), Some(plane)) => runner.fabric(plane).await?,
        (Command::Switches(_), Some(plane)) => runner.switches(plane).await?,
        (Command::Bootstrap(_), Some(plane)) => runner.bootstrap(plane).await?,
        (Command::Vlans(_), Some(plane)) => runner.vlans(plane).await?,
        (Command::Vpc(_), Some(plane)) => runner.vpc(plane).await?,
        (Command::Interfaces(_), Some(plane)) => runner.interfaces(plane).await?,
        (Command::Policies(_), Some(plane)) => runner.policies(plane).await?,
        (Command::All(_), Some(plane)) => runner.all(plane, &connector).await?,
        (_, None) => anyhow::bail!("NDFC connection required"),
    };

    for line in outcome.summary_lines() {
        println!("{}", line);
    }
    if outcome.failed() {
        std::process::exit(1);
    }
    Ok(())
}
