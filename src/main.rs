use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use opwatch::config::{Overrides, Settings};
use opwatch::data::duration::parse_duration;
use opwatch::ui::Theme;
use opwatch::{dashboard, logging, App, DemoClient, ServerClient, ServerHandle, Supervisor};

/// Polls left before a flaky demo server drops out again.
const DEMO_OUTAGE_EVERY: u64 = 15;

const DEMO_REPLICA_SET: &str = "rs-demo";

#[derive(Parser, Debug)]
#[command(name = "opwatch", version)]
#[command(about = "Live view of in-flight operations across several database servers")]
struct Args {
    /// Servers to watch (host or host:port); ignored if the config file lists servers
    addresses: Vec<String>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll interval (e.g., "1s", "500ms")
    #[arg(short, long, value_parser = parse_duration)]
    refresh: Option<std::time::Duration>,

    /// Deadline for one poll; must be shorter than the refresh interval
    #[arg(long, value_parser = parse_duration)]
    fetch_timeout: Option<std::time::Duration>,

    /// Deadline for explain and kill
    #[arg(long, value_parser = parse_duration)]
    action_timeout: Option<std::time::Duration>,

    /// Hide replication traffic (oplog tailing)
    #[arg(long)]
    hide_replication: bool,

    /// Watch simulated servers instead of real ones
    #[arg(long)]
    demo: bool,

    /// Append logs to this file (filter with OPWATCH_LOG or RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_file.as_deref())?;

    let overrides = Overrides {
        addresses: args.addresses.clone(),
        refresh: args.refresh,
        fetch_timeout: args.fetch_timeout,
        action_timeout: args.action_timeout,
        hide_replication: args.hide_replication.then_some(true),
        demo: args.demo,
    };
    let settings = Settings::load(args.config.as_deref(), &overrides)?;
    tracing::info!(servers = settings.servers.len(), refresh = ?settings.refresh, "settings loaded");

    let rt = tokio::runtime::Runtime::new()?;

    let handles = connect_all(&settings, args.demo)?;
    let supervisor = rt.block_on(async { Supervisor::start(handles, settings.timing()) });

    let app = App::new(supervisor.aggregator().subscribe(), Theme::auto_detect());
    let result = dashboard::run_tui(app, supervisor.dispatcher().clone(), rt.handle().clone());

    rt.block_on(supervisor.shutdown());
    result
}

/// Build one handle per configured server. Nothing is dialled here; an
/// unreachable server shows up as DOWN once its poller runs.
fn connect_all(settings: &Settings, demo: bool) -> Result<Vec<Arc<ServerHandle>>> {
    let last = settings.servers.len().saturating_sub(1);
    let members: Vec<String> = settings.servers.iter().map(|s| s.info.address.clone()).collect();
    let mut handles = Vec::with_capacity(settings.servers.len());
    for (index, spec) in settings.servers.iter().enumerate() {
        let client: Arc<dyn ServerClient> = if demo {
            let client = DemoClient::new(&spec.info.address).with_replica_set(DEMO_REPLICA_SET, members.clone());
            // One server in a multi-server demo comes and goes
            if index == last && last > 0 {
                Arc::new(client.with_outages(DEMO_OUTAGE_EVERY))
            } else {
                Arc::new(client)
            }
        } else {
            connect(&spec.info.address, settings)?
        };
        let handle = ServerHandle::new(spec.info.clone(), client).with_hide_replication(spec.hide_replication);
        handles.push(Arc::new(handle));
    }
    Ok(handles)
}

#[cfg(feature = "mongo")]
fn connect(address: &str, settings: &Settings) -> Result<Arc<dyn ServerClient>> {
    Ok(Arc::new(opwatch::MongoClient::new(address, settings.fetch_timeout)))
}

#[cfg(not(feature = "mongo"))]
fn connect(_address: &str, _settings: &Settings) -> Result<Arc<dyn ServerClient>> {
    anyhow::bail!("built without the default `mongo` feature; rebuild with it or run with --demo")
}
