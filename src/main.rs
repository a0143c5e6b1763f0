//! supply-trace: command-line front end for the product-traceability contract
//!
//! ```text
//! supply-trace [--env dev] grant <address>
//! supply-trace [--env dev] upload <file>
//! supply-trace [--env dev] register --id <id> --name <name> --quality <q> (--file <path> | --cid <cid>)
//! supply-trace [--env dev] verify <code>
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{ArgGroup, Parser, Subcommand};

use supply_trace::config::AppConfig;
use supply_trace::contract::TraceContract;
use supply_trace::flows::{RegistrationForm, TraceClient};
use supply_trace::ledger::{ConfirmationWatcher, JsonRpcLedger, ReadOnlyQuery, SubmissionService};
use supply_trace::lifecycle::{ControllerOptions, LifecycleSnapshot, LifecycleStatus};
use supply_trace::links::ExplorerLinks;
use supply_trace::pinning::{ContentId, ContentPinner, PinataClient};
use supply_trace::verify::{VerificationQuery, VerifyStatus};

#[derive(Parser)]
#[command(
    name = "supply-trace",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"),
    about = "Register and verify products on the traceability contract"
)]
struct Cli {
    /// Config environment, loads config/<env>.yaml
    #[arg(short, long, default_value = "dev", env = "SUPPLY_TRACE_ENV")]
    env: String,

    /// Use the in-memory ledger instead of the configured node
    #[cfg(feature = "mock-ledger")]
    #[arg(long)]
    mock_ledger: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant the manufacturer role to an address (admin only)
    Grant { address: String },

    /// Pin a metadata file and print its CID
    Upload { file: PathBuf },

    /// Register a product batch
    #[command(group(ArgGroup::new("content").required(true).args(["file", "cid"])))]
    Register {
        /// Product code, e.g. COCOA002
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        quality: String,

        /// Metadata file to pin before registering
        #[arg(long)]
        file: Option<PathBuf>,

        /// CID of metadata that is already pinned
        #[arg(long)]
        cid: Option<String>,
    },

    /// Look up a product by code
    Verify { code: String },
}

struct Backend {
    submitter: Arc<dyn SubmissionService>,
    watcher: Arc<dyn ConfirmationWatcher>,
    query: Arc<dyn ReadOnlyQuery>,
}

impl Backend {
    fn connect(cli: &Cli, config: &AppConfig) -> anyhow::Result<Self> {
        if let Some(backend) = Self::in_memory(cli) {
            return Ok(backend);
        }
        let ledger = Arc::new(JsonRpcLedger::new(config.ledger.clone())?);
        Ok(Self {
            submitter: ledger.clone(),
            watcher: ledger.clone(),
            query: ledger,
        })
    }

    #[cfg(feature = "mock-ledger")]
    fn in_memory(cli: &Cli) -> Option<Self> {
        use supply_trace::ledger::Finality;
        use supply_trace::ledger::mock::MockLedger;

        if !cli.mock_ledger {
            return None;
        }
        tracing::warn!("Using in-memory ledger; nothing reaches a node");
        let ledger = Arc::new(MockLedger::new());
        ledger.set_auto_finality(Some(Finality::Finalized));
        Some(Self {
            submitter: ledger.clone(),
            watcher: ledger.clone(),
            query: ledger,
        })
    }

    #[cfg(not(feature = "mock-ledger"))]
    fn in_memory(_cli: &Cli) -> Option<Self> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.env)?;
    let _log_guard = supply_trace::logging::init_logging(&config);
    tracing::info!(
        env = %cli.env,
        git_hash = env!("GIT_HASH"),
        "Starting supply-trace"
    );

    let links = ExplorerLinks::from_config(&config.links);
    let contract = TraceContract::new(config.ledger.contract_address.clone())
        .with_gas(config.gas.grant_manufacturer, config.gas.register_product);

    match &cli.command {
        Commands::Upload { file } => {
            let pinner = PinataClient::from_config(&config.pinning)?;
            let cid = pin_file(&pinner, file).await?;
            println!("CID: {}", cid);
            println!("{}", links.content_url(cid.as_str()));
        }
        Commands::Verify { code } => {
            let backend = Backend::connect(&cli, &config)?;
            let query = VerificationQuery::new(contract, backend.query);
            print_verification(&links, code, query.verify(code).await)?;
        }
        Commands::Grant { address } => {
            let client = trace_client(&cli, &config, contract, links)?;
            println!("Contract: {}", client.contract_link());
            client.grant_manufacturer(address)?;
            let settled = follow(&client).await;
            finish(&client, &settled, &format!("{} is now a manufacturer", address.trim()))?;
        }
        Commands::Register {
            id,
            name,
            quality,
            file,
            cid,
        } => {
            let mut form = RegistrationForm::new(id.as_str(), name.as_str(), quality.as_str());
            if let Some(cid) = cid {
                let cid = ContentId::new(cid.as_str()).ok_or_else(|| anyhow!("--cid is empty"))?;
                form.set_content_id(cid);
            } else if let Some(file) = file {
                let pinner = PinataClient::from_config(&config.pinning)?;
                let bytes = read_file(file).await?;
                let cid = form.upload(&pinner, &file_name(file), bytes).await?;
                println!("CID: {}", cid);
            }

            let client = trace_client(&cli, &config, contract, links)?;
            client.register_product(&form)?;
            let settled = follow(&client).await;
            finish(&client, &settled, &format!("Product {} registered", id.trim()))?;
        }
    }

    Ok(())
}

fn trace_client(
    cli: &Cli,
    config: &AppConfig,
    contract: TraceContract,
    links: ExplorerLinks,
) -> anyhow::Result<TraceClient> {
    let backend = Backend::connect(cli, config)?;
    let options = ControllerOptions {
        optimistic_confirm_after: config.lifecycle.optimistic_confirm_after(),
    };
    Ok(TraceClient::new(
        contract,
        backend.submitter,
        backend.watcher,
        options,
        links,
    ))
}

/// Print each status change until nothing is in flight
async fn follow(client: &TraceClient) -> LifecycleSnapshot {
    let mut rx = client.controller().subscribe();
    let mut last = None;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if last != Some(snapshot.status) {
            match snapshot.status {
                LifecycleStatus::Submitting => println!("Confirm in wallet..."),
                LifecycleStatus::AwaitingConfirmation => {
                    println!("Confirming on chain...");
                    if let Some(link) = client.tx_link(&snapshot) {
                        println!("  {}", link);
                    }
                }
                _ => {}
            }
            last = Some(snapshot.status);
        }
        if !snapshot.is_busy() {
            return snapshot;
        }
        if rx.changed().await.is_err() {
            return client.controller().snapshot();
        }
    }
}

fn finish(client: &TraceClient, settled: &LifecycleSnapshot, success: &str) -> anyhow::Result<()> {
    match settled.status {
        LifecycleStatus::Confirmed => {
            println!("✅ {}", success);
            if settled.assumed_success {
                println!("   (assumed: no receipt yet, check the explorer)");
            }
            if let Some(link) = client.tx_link(settled) {
                println!("   {}", link);
            }
            Ok(())
        }
        LifecycleStatus::Failed => {
            if let Some(link) = client.tx_link(settled) {
                eprintln!("   {}", link);
            }
            match &settled.error {
                Some(e) => bail!("❌ [{}] {}", e.code(), e),
                None => bail!("❌ Transaction failed"),
            }
        }
        other => bail!("Transaction ended in {}", other),
    }
}

fn print_verification(links: &ExplorerLinks, code: &str, status: VerifyStatus) -> anyhow::Result<()> {
    match status {
        VerifyStatus::Success(result) => {
            println!("✅ Verified product {}", code.trim());
            println!("Name:      {}", result.name);
            println!("Quality:   {}", result.quality);
            println!("Issuer:    {}", result.issuer);
            println!("Issued at: {}", result.issued_at_display());
            println!("Metadata:  {}", links.content_url(&result.content_id));
            Ok(())
        }
        VerifyStatus::NotFound => bail!("Product not found or inactive"),
        VerifyStatus::Error(e) => bail!("Verification failed: {}", e),
        VerifyStatus::Idle | VerifyStatus::Loading => bail!("Enter a product code"),
    }
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metadata".to_string())
}

async fn pin_file(pinner: &dyn ContentPinner, path: &Path) -> anyhow::Result<ContentId> {
    let bytes = read_file(path).await?;
    Ok(pinner.pin(&file_name(path), bytes).await?)
}
