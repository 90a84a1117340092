/// # fileset-sync CLI
///
/// Command parsing and orchestration for the local host harness. All
/// synchronization logic lives in [`fileset_sync_core`]; this module only
/// loads configuration, builds the S3 store and dispatches to [`LocalHost`].
///
/// ## How To Use
/// - From the shell: `fileset-sync apply --config fileset-sync.yaml`.
/// - Programmatically (tests): construct a [`Cli`] and call [`run`].
use crate::host::{LocalHost, ResourceReport, DEFAULT_STATE_FILE};
use crate::load_config::{load_config, HarnessConfig};
use crate::store::S3Store;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use fileset_sync_core::publish::ConfirmationPolicy;
use fileset_sync_core::{OperationContext, Reconciler};
use std::path::PathBuf;

/// Publish local filesets to S3 as immutable, content-addressed units.
#[derive(Parser)]
#[clap(
    name = "fileset-sync",
    version,
    about = "Publish local filesets to S3 buckets and track them in a local state file"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Paths {
    /// Path to the YAML config file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to the JSON state file
    #[clap(long, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, update or replace every configured fileset
    Apply {
        #[clap(flatten)]
        paths: Paths,
    },
    /// Re-read local files for every recorded fileset without uploading
    Refresh {
        #[clap(flatten)]
        paths: Paths,
    },
    /// Stop managing every recorded fileset. Uploaded objects are kept
    Destroy {
        #[clap(flatten)]
        paths: Paths,
    },
    /// Adopt an already uploaded fileset under a configured resource name
    Import {
        /// Resource name as it appears under `resources` in the config
        name: String,
        /// Identity of the existing fileset
        identity: String,
        #[clap(flatten)]
        paths: Paths,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Apply { .. } => "apply",
            Commands::Refresh { .. } => "refresh",
            Commands::Destroy { .. } => "destroy",
            Commands::Import { .. } => "import",
        }
    }

    fn paths(&self) -> &Paths {
        match self {
            Commands::Apply { paths }
            | Commands::Refresh { paths }
            | Commands::Destroy { paths }
            | Commands::Import { paths, .. } => paths,
        }
    }
}

async fn build_host(config: &HarnessConfig, state: PathBuf) -> LocalHost<S3Store> {
    let store = S3Store::from_settings(&config.store).await;
    let mut policy = ConfirmationPolicy::default();
    if let Some(ceiling) = config.confirmation_timeout() {
        policy = policy.with_ceiling(ceiling);
    }
    let reconciler = Reconciler::new(store)
        .with_root(config.root())
        .with_confirmation_policy(policy);
    LocalHost::new(reconciler, state)
}

fn log_reports(command: &str, reports: &[ResourceReport]) {
    for report in reports {
        tracing::info!(
            command,
            resource = %report.name,
            action = %report.action,
            warnings = report.diagnostics.warnings().count(),
            "Resource processed"
        );
    }
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let command = cli.command.name();
    let paths = cli.command.paths().clone();
    let config = load_config(&paths.config)?;
    tracing::info!(command, state_path = ?paths.state, "Starting command");

    let host = build_host(&config, paths.state).await;
    let ctx = OperationContext::background();

    let result = match &cli.command {
        Commands::Apply { .. } => host.apply(&config.resources, &ctx).await,
        Commands::Refresh { .. } => host.refresh(&ctx).await,
        Commands::Destroy { .. } => host.destroy(&ctx).await,
        Commands::Import { name, identity, .. } => {
            let resource = config.resource(name)?;
            host.import(name, resource, identity, &ctx)
                .await
                .map(|report| vec![report])
        }
    };

    match result {
        Ok(reports) => {
            log_reports(command, &reports);
            tracing::info!(command, resources = reports.len(), "Command complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command, error = %e, "Command failed");
            Err(e)
        }
    }
}
