//! explorer-data CLI: failover fetch, route invocation, holder snapshot, health.

use clap::{Args, Parser, Subcommand, ValueEnum};
use explorer_data::upstream::BackendRequest;
use explorer_data::{
    ApiRoutes, BackendClient, BackendConfig, CacheConfig, CacheHandle, ChainRegistry,
    EndpointRole, MirrorHolderLoader, SnapshotStore,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Fetch(args) => run_fetch(args),
        Command::Route(args) => run_route(args),
        Command::Holders(args) => run_holders(args),
        Command::Health(args) => run_health(args),
    }
}

#[derive(Parser)]
#[command(name = "explorer-data")]
#[command(about = "Resilient multi-backend data access for a chain explorer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a path with failover and print the payload and winning origin.
    Fetch(FetchArgs),
    /// Invoke an API route with key=value query pairs.
    Route(RouteArgs),
    /// Load the holder snapshot and print the top holders or one address.
    Holders(HoldersArgs),
    /// Run a fetch and print per-origin health counters.
    Health(FetchArgs),
}

#[derive(Args)]
struct BackendArgs {
    /// Chain registry JSON (`{"chains": [...]}`).
    #[arg(long)]
    registry: Option<PathBuf>,
    #[arg(long)]
    primary_mirror: Option<String>,
    #[arg(long)]
    secondary_mirror: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Chain endpoints, then both mirrors.
    Smart,
    /// Primary then secondary mirror.
    Plain,
    /// Primary mirror only.
    Single,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Rpc,
    Api,
}

impl From<Role> for EndpointRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Rpc => EndpointRole::Rpc,
            Role::Api => EndpointRole::Api,
        }
    }
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    backend: BackendArgs,
    #[arg(long)]
    path: String,
    #[arg(long, value_enum, default_value = "smart")]
    mode: Mode,
    /// Required for smart mode.
    #[arg(long)]
    chain: Option<String>,
    #[arg(long, value_enum, default_value = "api")]
    role: Role,
    /// Query pair, repeatable: `--query chain=demo-1`.
    #[arg(long = "query", value_parser = parse_pair)]
    query: Vec<(String, String)>,
}

#[derive(Args)]
struct RouteArgs {
    #[command(flatten)]
    backend: BackendArgs,
    /// network, validators, supply or holders.
    name: String,
    /// Query pairs, e.g. `chain=demo-1 status=bonded`.
    #[arg(value_parser = parse_pair)]
    params: Vec<(String, String)>,
}

#[derive(Args)]
struct HoldersArgs {
    #[command(flatten)]
    backend: BackendArgs,
    #[arg(long)]
    chain: String,
    #[arg(long, default_value_t = 10)]
    top: usize,
    #[arg(long)]
    address: Option<String>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn build_client(args: &BackendArgs) -> Result<Arc<BackendClient>, Box<dyn std::error::Error>> {
    let registry = match &args.registry {
        Some(path) => ChainRegistry::load(path)?,
        None => ChainRegistry::default(),
    };
    let mut config = BackendConfig::from_env();
    if let Some(v) = &args.primary_mirror {
        config.primary_mirror = v.clone();
    }
    if let Some(v) = &args.secondary_mirror {
        config.secondary_mirror = v.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.timeout_ms = ms;
    }
    info!(chains = registry.len(), primary = %config.primary_mirror, "backend configured");
    Ok(Arc::new(BackendClient::new(config, Arc::new(registry))?))
}

/// Cancels `cancel` on ctrl-c so the current attempt is dropped.
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

fn fetch_once(
    client: &BackendClient,
    args: &FetchArgs,
    rt: &tokio::runtime::Runtime,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request: BackendRequest = client.request(args.path.clone());
    for (k, v) in &args.query {
        request = request.query(k.clone(), v.clone());
    }
    let fetched = rt.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(&cancel);
        match args.mode {
            Mode::Smart => {
                let chain = args.chain.as_deref().ok_or("--chain is required for smart mode")?;
                Ok::<_, Box<dyn std::error::Error>>(
                    client.smart(chain, args.role.into(), &request, &cancel).await?,
                )
            }
            Mode::Plain => Ok(client.plain(&request, &cancel).await?),
            Mode::Single => Ok(client.single(&request, &cancel).await?),
        }
    })?;
    for failure in &fetched.failures {
        eprintln!("failed\t{failure}");
    }
    eprintln!("origin\t{}", fetched.origin);
    println!("{}", serde_json::to_string_pretty(&fetched.payload)?);
    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(&args.backend)?;
    let rt = tokio::runtime::Runtime::new()?;
    fetch_once(&client, &args, &rt)
}

fn run_health(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(&args.backend)?;
    let rt = tokio::runtime::Runtime::new()?;
    if let Err(e) = fetch_once(&client, &args, &rt) {
        eprintln!("fetch failed: {e}");
    }
    println!("{}", serde_json::to_string_pretty(&client.health())?);
    Ok(())
}

fn run_route(args: RouteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(&args.backend)?;
    let rt = tokio::runtime::Runtime::new()?;
    let snapshots = SnapshotStore::new();
    let routes = ApiRoutes::new(
        Arc::clone(&client),
        Arc::clone(&snapshots),
        CacheHandle::new(CacheConfig::default()),
    )?;
    let route = routes.get(&args.name).ok_or_else(|| {
        let known: Vec<&str> = routes.names().collect();
        format!("unknown route {:?}; known: {}", args.name, known.join(", "))
    })?;
    let query: HashMap<String, String> = args.params.into_iter().collect();

    let resp = rt.block_on(async {
        if route.name() == "holders" {
            if let Some(chain) = query.get("chain") {
                let loader = MirrorHolderLoader::new(Arc::clone(&client), chain.clone());
                snapshots
                    .load_snapshot(&loader, &CancellationToken::new())
                    .await?;
            }
        }
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(&cancel);
        Ok::<_, Box<dyn std::error::Error>>(route.handle_with_cancel(&query, cancel).await)
    })?;
    println!("{}", resp.status);
    for (k, v) in &resp.headers {
        println!("{k}: {v}");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(resp.body.as_ref())?);
    if !resp.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_holders(args: HoldersArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(&args.backend)?;
    let rt = tokio::runtime::Runtime::new()?;
    let store = SnapshotStore::new();
    let loader = MirrorHolderLoader::new(client, args.chain.clone());
    let snapshot = rt.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(&cancel);
        store.load_snapshot(&loader, &cancel).await
    })?;
    info!(chain = %args.chain, holders = snapshot.len(), "snapshot loaded");

    if let Some(address) = &args.address {
        match snapshot.find_by_key(address) {
            Some(holder) => println!("{}", serde_json::to_string_pretty(holder)?),
            None => {
                eprintln!("no holder {address}");
                std::process::exit(1);
            }
        }
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&snapshot.summary())?);
    for holder in snapshot.top_n(args.top) {
        println!("{}\t{}\t{}", holder.rank, holder.address, holder.balance);
    }
    Ok(())
}
