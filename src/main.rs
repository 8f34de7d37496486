//! fulfillment-launcher v0.1 — entry point
//!
//! Parses the launch configuration, builds the component catalog and
//! (unless `--noworker`) the task poller, then runs the monitor loop.
//! Logs are structured JSON, written to `--logfile`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use fulfillment_launcher::catalog::Catalog;
use fulfillment_launcher::config;
use fulfillment_launcher::launcher::{Launcher, Timeouts};
use fulfillment_launcher::logging::{init_tracing, EventLog, TracingEventLog};
use fulfillment_launcher::task_poller::{NullQueueClient, QueueClient, TaskPoller};

#[derive(Debug, Parser)]
#[command(name = "launcher")]
#[command(about = "Supervises a fleet of JVM worker processes", long_about = None)]
struct Cli {
    /// Class names (or substrings thereof) to launch. Empty launches the
    /// default enabled subset of the catalog.
    classes: Vec<String>,

    /// Path to the worker jar. Defaults to a jar named after the binary
    /// itself, sitting next to the launcher executable.
    #[arg(short = 'j', long = "jarname")]
    jarname: Option<PathBuf>,

    /// Path to the log file.
    #[arg(
        short = 'l',
        long = "logfile",
        default_value = "/var/log/balihoo/fulfillment/launcher.log"
    )]
    logfile: PathBuf,

    /// Seconds to wait after a child dies before relaunching it.
    #[arg(short = 'd', long = "launchdelay", default_value_t = 600)]
    launchdelay: u64,

    /// Seconds of silence before sending a ping.
    #[arg(short = 'p', long = "ping", default_value_t = 300)]
    ping: u64,

    /// Seconds of silence before sending a quit directive.
    #[arg(short = 'q', long = "quit", default_value_t = 600)]
    quit: u64,

    /// Seconds of silence before sending SIGTERM.
    #[arg(short = 't', long = "terminate", default_value_t = 900)]
    terminate: u64,

    /// Seconds of silence before sending SIGKILL.
    #[arg(short = 'k', long = "kill", default_value_t = 1200)]
    kill: u64,

    /// Path to the endpoint config file.
    #[arg(short = 'c', long = "config", default_value = "config/aws.properties.private")]
    config: PathBuf,

    /// Path to the New Relic JVM agent jar.
    #[arg(
        long = "newrelicagent",
        default_value = "/opt/newrelic/newrelic-agent.jar"
    )]
    newrelicagent: PathBuf,

    /// Do not attach the New Relic agent to launched workers.
    #[arg(long = "nonewrelic")]
    nonewrelic: bool,

    /// Do not start the task poller.
    #[arg(long = "noworker")]
    noworker: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, Some(&cli.logfile));

    let log: Arc<dyn EventLog> = Arc::new(TracingEventLog);

    if let Err(e) = run(cli, log.clone()) {
        log.exception("launcher exiting", &[("error", &format!("{e:#}"))]);
        std::process::exit(1);
    }
    Ok(())
}

/// Default jar path when `--jarname` is not given: a jar named after the
/// current executable, sitting next to it.
fn default_jarname() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("resolving launcher executable path")?;
    let dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = exe
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("launcher");
    Ok(dir.join(format!("{stem}.jar")))
}

fn run(cli: Cli, log: Arc<dyn EventLog>) -> Result<()> {
    let jarname = match cli.jarname {
        Some(path) => path,
        None => default_jarname()?,
    };

    let task_poller = if cli.noworker {
        None
    } else {
        let endpoint = config::load(&cli.config).context("loading launcher config")?;
        let client: Arc<dyn QueueClient> = Arc::new(NullQueueClient);
        let poller = TaskPoller::new(&endpoint.region, client)
            .with_context(|| format!("resolving region {}", endpoint.region))?;
        Some(poller.start_async_polling())
    };

    let agent = if cli.nonewrelic {
        None
    } else {
        Some(cli.newrelicagent.clone())
    };

    let mut launcher = Launcher::new(
        jarname,
        Catalog::default_catalog(),
        log,
        task_poller,
        agent,
    );

    let timeouts = Timeouts {
        ping: Duration::from_secs(cli.ping),
        quit: Duration::from_secs(cli.quit),
        terminate: Duration::from_secs(cli.terminate),
        kill: Duration::from_secs(cli.kill),
    };

    launcher.launch(&cli.classes);
    launcher.monitor(Duration::from_secs(cli.launchdelay), &timeouts);
}
