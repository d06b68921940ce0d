//! Liveroll - Live Update Lifecycle CLI
//!
//! The entry point for liveroll, handling:
//! - Bundle packaging and publishing (ops side)
//! - Update checks, staged downloads, and activation (device side)
//! - Confirmation and status inspection
//! - The watch loop that owns the confirmation-deadline timer

use clap::{Args, Parser, Subcommand};
use lr_bundle::BundlePacker;
use lr_common::{AppId, OutputFormat, VersionToken};
use lr_core::config::{load_config, UpdateConfig};
use lr_core::controller::{ApplyOutcome, CheckOutcome, UpdateController};
use lr_core::distribution::{
    CancelToken, DirEndpoint, DistributionEndpoint, HttpEndpoint, ReleaseInfo,
};
use lr_core::events::{EventLog, FanoutEmitter, JsonlWriter, UpdateEmitter};
use lr_core::exit_codes::ExitCode;
use lr_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use lr_core::watch::{WatchLoop, WatchMode};
use lr_core::Result;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Liveroll - ship, stage, and safely roll back live code updates
#[derive(Parser)]
#[command(name = "liveroll")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to liveroll.toml
    #[arg(long, global = true, env = "LIVEROLL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the device data directory
    #[arg(long, global = true, env = "LIVEROLL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Override the distribution endpoint (HTTP base URL or directory)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a built asset directory into a published bundle
    Pack(PackArgs),

    /// Query the distribution endpoint for a newer version
    Check,

    /// Check, download, stage, and activate in one step
    Update(UpdateArgs),

    /// Application self-check callback: confirm the pending bundle
    Confirm,

    /// Show the persisted update session
    Status,

    /// Replay the lifecycle event log
    Events,

    /// Run the watch loop (periodic checks + deadline timer)
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Built asset directory to package
    asset_dir: PathBuf,

    /// Application id
    #[arg(long)]
    app: String,

    /// Version token for the new bundle (numeric segments, e.g. 1.4.2)
    #[arg(long = "bundle-version")]
    bundle_version: String,

    /// Publish root (directory-endpoint layout)
    #[arg(long)]
    out: PathBuf,

    /// Optional release notes
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Override the confirmation window in seconds
    #[arg(long)]
    window: Option<u64>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Apply updates as soon as they are published
    #[arg(long)]
    auto: bool,

    /// Override the check interval in seconds
    #[arg(long)]
    interval: Option<u64>,
}

/// Distribution endpoint selected from configuration: HTTP base URL or a
/// local directory.
enum CliEndpoint {
    Http(HttpEndpoint),
    Dir(DirEndpoint),
}

impl CliEndpoint {
    fn from_spec(spec: &str) -> Self {
        if spec.starts_with("http://") || spec.starts_with("https://") {
            CliEndpoint::Http(HttpEndpoint::new(spec))
        } else {
            CliEndpoint::Dir(DirEndpoint::new(spec))
        }
    }
}

impl DistributionEndpoint for CliEndpoint {
    fn latest(&self, app_id: &AppId) -> Result<ReleaseInfo> {
        match self {
            CliEndpoint::Http(endpoint) => endpoint.latest(app_id),
            CliEndpoint::Dir(endpoint) => endpoint.latest(app_id),
        }
    }

    fn fetch(&self, release: &ReleaseInfo, cancel: &CancelToken) -> Result<Vec<u8>> {
        match self {
            CliEndpoint::Http(endpoint) => endpoint.fetch(release, cancel),
            CliEndpoint::Dir(endpoint) => endpoint.fetch(release, cancel),
        }
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: LogLevel::from_flags(cli.global.verbose, cli.global.quiet),
        format: match cli.global.format {
            OutputFormat::Json | OutputFormat::Jsonl => LogFormat::Jsonl,
            OutputFormat::Summary => LogFormat::Human,
        },
    };
    init_logging(&log_config);

    match run(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("error: {}", err);
            ExitCode::from_error(&err).into()
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Pack(args) => cmd_pack(&cli.global, args),
        Commands::Check => cmd_check(&cli.global),
        Commands::Update(args) => cmd_update(&cli.global, args),
        Commands::Confirm => cmd_confirm(&cli.global),
        Commands::Status => cmd_status(&cli.global),
        Commands::Events => cmd_events(&cli.global),
        Commands::Watch(args) => cmd_watch(&cli.global, args),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_pack(global: &GlobalOpts, args: PackArgs) -> Result<ExitCode> {
    let version = VersionToken::parse(&args.bundle_version)?;
    let app_id = AppId::from(args.app.as_str());

    let mut packer = BundlePacker::new(app_id.clone(), version.clone());
    if let Some(description) = &args.description {
        packer = packer.with_description(description.clone());
    }

    let artifact_rel = format!("artifacts/{}-{}.zip", args.app, version);
    let artifact_path = args.out.join(&artifact_rel);
    let packed = packer.pack(&args.asset_dir, &artifact_path)?;

    // Artifact first, then metadata: latest.json never points at a
    // partially written file.
    let release = ReleaseInfo {
        version: version.clone(),
        checksum: packed.checksum.clone(),
        url: artifact_rel,
    };
    DirEndpoint::new(&args.out).publish(&app_id, &release)?;

    print_payload(
        global,
        &json!({
            "app_id": &app_id,
            "version": &version,
            "checksum": &packed.checksum,
            "bytes": packed.bytes,
            "files": packed.manifest.file_count(),
            "artifact": &packed.path,
        }),
        &format!("packed {} {} ({} files)", app_id, version, packed.manifest.file_count()),
    )?;
    Ok(ExitCode::Clean)
}

fn cmd_check(global: &GlobalOpts) -> Result<ExitCode> {
    let mut controller = open_controller(global, None)?;
    let outcome = controller.check_for_update()?;
    let (payload, summary, code) = match &outcome {
        CheckOutcome::UpToDate => (
            json!({"outcome": "up_to_date", "active": controller.session().active_version()}),
            "up to date".to_string(),
            ExitCode::Clean,
        ),
        CheckOutcome::UpdateAvailable(release) => (
            json!({"outcome": "update_available", "version": &release.version, "checksum": &release.checksum}),
            format!("update available: {}", release.version),
            ExitCode::UpdateAvailable,
        ),
        CheckOutcome::AlreadyInFlight => (
            json!({"outcome": "already_in_flight", "state": controller.session().state}),
            "check already in flight".to_string(),
            ExitCode::Clean,
        ),
        CheckOutcome::Deferred => (
            json!({"outcome": "deferred", "state": controller.session().state}),
            "deferred: a bundle is awaiting confirmation".to_string(),
            ExitCode::AwaitingConfirmation,
        ),
    };
    print_payload(global, &payload, &summary)?;
    Ok(code)
}

fn cmd_update(global: &GlobalOpts, args: UpdateArgs) -> Result<ExitCode> {
    let mut controller = open_controller(global, args.window)?;
    let cancel = CancelToken::new();
    let outcome = controller.apply_now(&cancel)?;
    let (payload, summary, code) = match &outcome {
        ApplyOutcome::UpToDate => (
            json!({"outcome": "up_to_date"}),
            "up to date".to_string(),
            ExitCode::Clean,
        ),
        ApplyOutcome::Activated(version) => (
            json!({
                "outcome": "activated",
                "version": version,
                "confirmation_deadline": controller.confirmation_deadline(),
            }),
            format!("activated {}, awaiting confirmation", version),
            ExitCode::AwaitingConfirmation,
        ),
        ApplyOutcome::AlreadyInFlight => (
            json!({"outcome": "already_in_flight"}),
            "already in flight".to_string(),
            ExitCode::Clean,
        ),
        ApplyOutcome::Deferred => (
            json!({"outcome": "deferred"}),
            "deferred: a bundle is awaiting confirmation".to_string(),
            ExitCode::AwaitingConfirmation,
        ),
    };
    print_payload(global, &payload, &summary)?;
    Ok(code)
}

fn cmd_confirm(global: &GlobalOpts) -> Result<ExitCode> {
    let mut controller = open_controller(global, None)?;
    let confirmed = controller.notify_ready()?;
    let state = controller.session().state;
    print_payload(
        global,
        &json!({"confirmed": confirmed, "state": state}),
        &format!(
            "{} (state: {})",
            if confirmed { "confirmed" } else { "nothing to confirm" },
            state
        ),
    )?;
    Ok(ExitCode::Clean)
}

fn cmd_status(global: &GlobalOpts) -> Result<ExitCode> {
    let controller = open_controller(global, None)?;
    let session = controller.session();
    print_payload(
        global,
        &serde_json::to_value(session)?,
        &format!(
            "state: {}, active: {}, pending: {}",
            session.state,
            session
                .active_version()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string()),
            session
                .pending
                .as_ref()
                .map(|b| b.version.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ),
    )?;
    Ok(ExitCode::Clean)
}

fn cmd_events(global: &GlobalOpts) -> Result<ExitCode> {
    let (config, _) = load_config(global.config.as_deref())?;
    let config = apply_overrides(config, global, None);
    let data_dir = config.resolve_data_dir(global.data_dir.as_deref())?;
    let log = EventLog::new(&data_dir);
    for event in log.replay()? {
        println!("{}", event.to_jsonl());
    }
    Ok(ExitCode::Clean)
}

fn cmd_watch(global: &GlobalOpts, args: WatchArgs) -> Result<ExitCode> {
    let (mut config, _) = load_config(global.config.as_deref())?;
    if let Some(interval) = args.interval {
        config.check_interval_secs = interval;
    }
    let controller = build_controller(apply_overrides(config, global, None), global)?;
    let mode = if args.auto {
        WatchMode::AutoApply
    } else {
        WatchMode::NotifyOnly
    };
    WatchLoop::new(controller, mode).run()?;
    Ok(ExitCode::Clean)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn apply_overrides(
    mut config: UpdateConfig,
    global: &GlobalOpts,
    window: Option<u64>,
) -> UpdateConfig {
    if let Some(endpoint) = &global.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(window) = window {
        config.confirmation_window_secs = window;
    }
    config
}

fn open_controller(
    global: &GlobalOpts,
    window: Option<u64>,
) -> Result<UpdateController<CliEndpoint>> {
    let (config, source) = load_config(global.config.as_deref())?;
    tracing::debug!(%source, "Config loaded");
    build_controller(apply_overrides(config, global, window), global)
}

fn build_controller(
    config: UpdateConfig,
    global: &GlobalOpts,
) -> Result<UpdateController<CliEndpoint>> {
    let data_dir = config.resolve_data_dir(global.data_dir.as_deref())?;
    let endpoint = CliEndpoint::from_spec(&config.endpoint);

    let mut emitters: Vec<Arc<dyn UpdateEmitter>> = vec![Arc::new(EventLog::new(&data_dir))];
    if global.format == OutputFormat::Jsonl {
        emitters.push(Arc::new(JsonlWriter::new(std::io::stderr())));
    }
    let emitter = Arc::new(FanoutEmitter::new(emitters));

    UpdateController::open(config, &data_dir, endpoint, emitter)
}

fn print_payload(global: &GlobalOpts, payload: &serde_json::Value, summary: &str) -> Result<()> {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string_pretty(payload)?)
        }
        OutputFormat::Summary => println!("{}", summary),
    }
    Ok(())
}
