use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use pl_core::{ScanEvent, ScanStatus};
use pl_scan::{
    spawn_sweeper, ConfluenceClient, HttpDetector, LoggingNotifier, ScanReporter, ScanService,
    Subscription, DEFAULT_TASK_TTL,
};
use pl_store::vault::new_vault_salt;
use pl_store::{NewCheckpoint, Store, Vault};

mod paths;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pagelock PII audit for Confluence", long_about = None)]
struct Cli {
    /// Override the data directory (default: platform data dir, or
    /// PAGELOCK_DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Confluence base URL (or PAGELOCK_CONFLUENCE_URL)
    #[arg(long, global = true, env = "PAGELOCK_CONFLUENCE_URL")]
    confluence_url: Option<String>,

    /// Confluence API token (or PAGELOCK_CONFLUENCE_TOKEN)
    #[arg(long, global = true, env = "PAGELOCK_CONFLUENCE_TOKEN", hide_env_values = true)]
    confluence_token: Option<String>,

    /// Detection backend base URL (or PAGELOCK_DETECTOR_URL)
    #[arg(
        long,
        global = true,
        env = "PAGELOCK_DETECTOR_URL",
        default_value = "http://127.0.0.1:8787"
    )]
    detector_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the audit store and its vault salt
    Init,
    /// Scan one space (or all spaces) and follow the event stream
    Scan {
        /// Space key to scan; omit with --all to scan every space
        space: Option<String>,
        /// Scan every space of the instance (always starts fresh)
        #[arg(long)]
        all: bool,
        /// Purge any unfinished scan and start fresh
        #[arg(long)]
        force: bool,
    },
    /// Resume an unfinished scan from its checkpoints (latest by default)
    Resume { scan_id: Option<Uuid> },
    /// Mark a scan's open checkpoints Paused
    Pause { scan_id: Uuid },
    /// Summarise the latest scan (or a specific one)
    Report {
        scan_id: Option<Uuid>,
        /// Also list decrypted findings (requires the vault passphrase)
        #[arg(long)]
        findings: bool,
    },
    /// Delete every checkpoint, tally, and event
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Backend endpoints, resolved from flags or environment by clap.
struct Backends {
    confluence_url: Option<String>,
    confluence_token: Option<String>,
    detector_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let data = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => paths::data_dir()?,
    };
    let backends = Backends {
        confluence_url: cli.confluence_url,
        confluence_token: cli.confluence_token,
        detector_url: cli.detector_url,
    };

    match cli.command {
        Commands::Init => init_command(&data).await,
        Commands::Scan { space, all, force } => {
            scan_command(&data, &backends, space, all, force).await
        }
        Commands::Resume { scan_id } => resume_command(&data, &backends, scan_id).await,
        Commands::Pause { scan_id } => pause_command(&data, scan_id).await,
        Commands::Report { scan_id, findings } => report_command(&data, scan_id, findings).await,
        Commands::Purge { yes } => purge_command(&data, yes).await,
    }
}

async fn init_command(data: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(data)?;
    let salt_path = paths::salt_path(data);
    if salt_path.exists() {
        return Err(anyhow!(
            "audit store already initialised at {}",
            data.display()
        ));
    }

    let salt = new_vault_salt();
    std::fs::write(&salt_path, hex::encode(salt))?;

    // Opening runs the migrations, so the schema exists before first use.
    let store = Store::open(&paths::db_path(data), Vault::new()).await?;
    drop(store);

    println!("Audit store initialised at {}", data.display());
    Ok(())
}

async fn open_unlocked_store(data: &std::path::Path) -> Result<Store> {
    let salt = read_salt(data)?;
    let passphrase = passphrase_from_env_or_prompt()?;
    let vault = Vault::new();
    vault.unlock(passphrase.as_bytes(), &salt).await?;
    Ok(Store::open(&paths::db_path(data), vault).await?)
}

async fn open_locked_store(data: &std::path::Path) -> Result<Store> {
    Ok(Store::open(&paths::db_path(data), Vault::new()).await?)
}

fn read_salt(data: &std::path::Path) -> Result<[u8; 16]> {
    let hex_salt = std::fs::read_to_string(paths::salt_path(data))
        .with_context(|| format!("no vault salt in {} — run init first", data.display()))?;
    let bytes = hex::decode(hex_salt.trim()).context("vault salt is not valid hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("vault salt has the wrong length"))
}

fn passphrase_from_env_or_prompt() -> Result<String> {
    if let Ok(pass) = std::env::var("PAGELOCK_PASSPHRASE") {
        return Ok(pass);
    }
    Ok(rpassword::prompt_password("Vault passphrase: ")?)
}

fn build_service(store: &Store, backends: &Backends) -> Result<ScanService> {
    let confluence_url = backends
        .confluence_url
        .clone()
        .context("set --confluence-url or PAGELOCK_CONFLUENCE_URL")?;
    let confluence_token = backends
        .confluence_token
        .clone()
        .context("set --confluence-token or PAGELOCK_CONFLUENCE_TOKEN")?;

    Ok(ScanService::new(
        store.clone(),
        Arc::new(HttpDetector::new(backends.detector_url.clone())),
        Arc::new(ConfluenceClient::new(confluence_url, confluence_token)),
        Arc::new(LoggingNotifier),
    ))
}

async fn scan_command(
    data: &std::path::Path,
    backends: &Backends,
    space: Option<String>,
    all: bool,
    force: bool,
) -> Result<()> {
    let store = open_unlocked_store(data).await?;
    let service = build_service(&store, backends)?;

    let scan_id = match (space, all) {
        (Some(key), false) => service.stream_space(&key, force).await?,
        (None, true) => service.stream_all_spaces().await?,
        _ => return Err(anyhow!("pass a space key, or --all for every space")),
    };

    eprintln!("Scan {scan_id} started");
    follow_to_end(&service, scan_id).await
}

async fn resume_command(
    data: &std::path::Path,
    backends: &Backends,
    scan_id: Option<Uuid>,
) -> Result<()> {
    let store = open_unlocked_store(data).await?;
    let service = build_service(&store, backends)?;
    let scan_id = service.resume_all_spaces(scan_id).await?;
    eprintln!("Scan {scan_id} resumed");
    follow_to_end(&service, scan_id).await
}

/// Follow a scan with the buffer sweeper running, and stop the sweeper on
/// the way out.
async fn follow_to_end(service: &ScanService, scan_id: Uuid) -> Result<()> {
    let (sweeper, shutdown) = spawn_sweeper(
        service.task_manager(),
        Duration::from_secs(300),
        DEFAULT_TASK_TTL,
    );
    let result = follow(service, scan_id).await;
    let _ = shutdown.send(true);
    let _ = sweeper.await;
    result
}

/// Stream events to stdout as JSON lines until the producer finishes.
async fn follow(service: &ScanService, scan_id: Uuid) -> Result<()> {
    let Subscription { replay, mut live } = service
        .subscribe(scan_id)
        .await
        .ok_or_else(|| anyhow!("scan {scan_id} is not registered"))?;

    for event in &replay {
        print_event(event)?;
    }

    loop {
        let next = tokio::time::timeout(Duration::from_millis(500), live.recv()).await;
        match next {
            Ok(Ok(event)) => print_event(&event)?,
            Ok(Err(RecvError::Lagged(missed))) => {
                warn!(missed, "event stream lagged; some lines were skipped")
            }
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                if !service.is_running(scan_id).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_event(event: &ScanEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

async fn pause_command(data: &std::path::Path, scan_id: Uuid) -> Result<()> {
    let store = open_locked_store(data).await?;
    let checkpoints = store.checkpoints();
    let mut paused = 0;
    for cp in checkpoints.find_by_scan(scan_id).await? {
        if cp.status.is_terminal() || cp.status == ScanStatus::Paused {
            continue;
        }
        checkpoints
            .upsert(&NewCheckpoint {
                scan_id,
                space_key: cp.space_key,
                last_page_id: None,
                last_attachment_name: None,
                status: ScanStatus::Paused,
                progress: None,
            })
            .await?;
        paused += 1;
    }
    if paused == 0 {
        println!("Scan {scan_id} has no open checkpoints");
    } else {
        println!("Scan {scan_id}: {paused} space(s) paused");
    }
    Ok(())
}

async fn report_command(
    data: &std::path::Path,
    scan_id: Option<Uuid>,
    findings: bool,
) -> Result<()> {
    let store = if findings {
        open_unlocked_store(data).await?
    } else {
        open_locked_store(data).await?
    };
    let reporter = ScanReporter::new(store);

    let summary = match scan_id {
        Some(id) => reporter.scan_summary(id).await?,
        None => reporter
            .latest_scan()
            .await?
            .ok_or_else(|| anyhow!("no scans recorded yet"))?,
    };

    println!("Scan {}", summary.scan_id);
    for state in &summary.spaces {
        let cp = &state.checkpoint;
        println!(
            "  {:<12} {:<10} {:>6} high={} medium={} low={}",
            cp.space_key,
            cp.status.display().as_str(),
            cp.progress
                .map(|p| format!("{p:.1}%"))
                .unwrap_or_else(|| "-".to_string()),
            state.counts.high,
            state.counts.medium,
            state.counts.low,
        );
    }
    println!(
        "  totals: high={} medium={} low={} ({} events)",
        summary.totals.high, summary.totals.medium, summary.totals.low, summary.event_count
    );

    if findings {
        println!();
        for stored in reporter.findings_for_scan(summary.scan_id).await? {
            let page = stored.event.page_title.as_deref().unwrap_or("-");
            for entity in &stored.event.entities {
                println!(
                    "  [{}] {} ({:.0}%): {}",
                    stored.event.space_key,
                    page,
                    entity.confidence * 100.0,
                    entity.masked_context
                );
            }
        }
    }
    Ok(())
}

async fn purge_command(data: &std::path::Path, yes: bool) -> Result<()> {
    if !yes {
        return Err(anyhow!("purge deletes every scan record; re-run with --yes"));
    }
    let store = open_locked_store(data).await?;
    let mut removed = store.checkpoints().delete_all().await?;
    removed += store.severity_counts().delete_all().await?;
    removed += store.events().delete_all().await?;
    println!("Removed {removed} rows");
    Ok(())
}
