//! mixgate - mixer control registry CLI
//!
//! Subcommands mirror the gateway commands:
//! - `mixgate cards` / `mixgate card` - list or describe sound cards
//! - `mixgate controls [numid|all]` - dump control documents
//! - `mixgate set <numid> <value>` / `mixgate set-many` - write controls
//! - `mixgate store|load|sessions` - session snapshots
//!
//! Every command prints the JSON response envelope; the exit status is 1 when
//! the status is `fatal` or `fail`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mixconf::MixConfig;
use mixgate::envelope::TYPE_SESSION;
use mixgate::{Command, ControlBackend, Gateway, MemoryBackend, NumidSel, Request, Response};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mixgate")]
#[command(about = "Mixer control registry as JSON, with session snapshots")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./mixgate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Device id, e.g. hw:0
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Detail tier: 0 (full) to 3 (minimal)
    #[arg(short, long, global = true)]
    tier: Option<u8>,

    /// Use a simulated card described by a JSON fixture
    #[arg(long, global = true, env = "MIXGATE_SIM")]
    sim: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the gateway answers
    Ping,

    /// List sound cards
    Cards,

    /// Describe one sound card
    Card,

    /// Dump control documents
    Controls {
        /// Numid to show, or "all"
        #[arg(default_value = "all")]
        numid: String,
    },

    /// Write one control from a value expression
    Set {
        numid: u32,

        /// e.g. "80%", "on", "10,20", "Line"
        value: String,
    },

    /// Write several controls from JSON value arrays
    SetMany {
        /// Comma separated numids
        #[arg(long, value_delimiter = ',', required = true)]
        numids: Vec<u32>,

        /// JSON array of value arrays, one per numid
        #[arg(long)]
        values: String,
    },

    /// Snapshot every control into a session
    Store {
        /// Session name
        #[arg(default_value = "current")]
        name: String,

        /// JSON info block (must carry "type": "session_info")
        #[arg(long)]
        info: Option<String>,
    },

    /// Re-apply a stored session
    Load {
        /// Session name
        #[arg(default_value = "current")]
        name: String,
    },

    /// List stored sessions
    Sessions,

    /// Print the effective configuration
    Config {
        /// Also write it to this file
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_request(cli: &Cli) -> Result<Request> {
    let mut request = match &cli.command {
        Commands::Ping => Request::new("ping"),
        Commands::Cards => Request::new("get-cards"),
        Commands::Card => Request::new("get-card"),
        Commands::Controls { numid } => {
            let mut req = Request::new("get-controls");
            req.numid = Some(match numid.parse::<u32>() {
                Ok(id) => NumidSel::Id(id),
                Err(_) => NumidSel::Keyword(numid.clone()),
            });
            req
        }
        Commands::Set { numid, value } => {
            let mut req = Request::new("set-one");
            req.numid = Some(NumidSel::Id(*numid));
            req.value = Some(value.clone());
            req
        }
        Commands::SetMany { numids, values } => {
            let mut req = Request::new("set-many");
            req.numids = numids.clone();
            req.values = serde_json::from_str(values)
                .context("--values must be a JSON array of arrays")?;
            req
        }
        Commands::Store { name, info } => {
            let mut req = Request::new("session-store");
            req.session = Some(name.clone());
            req.info = info
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("--info must be JSON")?;
            req
        }
        Commands::Load { name } => {
            let mut req = Request::new("session-load");
            req.session = Some(name.clone());
            req
        }
        Commands::Sessions => Request::new("session-list"),
        Commands::Config { .. } => anyhow::bail!("config is not a gateway command"),
    };

    request.device = cli.device.clone();
    request.tier = cli.tier;
    Ok(request)
}

fn serve<B: ControlBackend>(backend: B, config: &MixConfig, request: Request) -> Response {
    let gateway = Gateway::new(backend, config);
    if Command::lookup(&request.command) == Some(Command::SessionStore) {
        if let Err(err) = gateway.sessions().check_dir() {
            return Response::from_error(TYPE_SESSION, &err);
        }
    }
    gateway.handle(request)
}

#[cfg(feature = "alsa")]
fn serve_hardware(config: &MixConfig, request: Request) -> Result<Response> {
    Ok(serve(mixgate::AlsaBackend, config, request))
}

#[cfg(not(feature = "alsa"))]
fn serve_hardware(_config: &MixConfig, _request: Request) -> Result<Response> {
    anyhow::bail!("built without ALSA support; rebuild with --features alsa or pass --sim <fixture>")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = MixConfig::load_with_sources_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_tracing(&config.telemetry.log_level);

    if let Commands::Config { write } = &cli.command {
        if let Some(path) = write {
            config.save(path)?;
            tracing::info!(path = %path.display(), "configuration written");
        }
        for file in &sources.files {
            println!("# loaded {}", file.display());
        }
        for var in &sources.env_overrides {
            println!("# override {var}");
        }
        print!("{}", config.to_toml());
        return Ok(());
    }

    let request = build_request(&cli)?;
    let response = match &cli.sim {
        Some(path) => {
            let backend = MemoryBackend::from_path(path)
                .with_context(|| format!("failed to load simulated card {}", path.display()))?;
            serve(backend, &config, request)
        }
        None => serve_hardware(&config, request)?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status.is_error() {
        std::process::exit(1);
    }
    Ok(())
}
