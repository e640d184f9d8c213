use anyhow::{Context, Result};
use clap::Parser;
use diascreen::analyzer::{HttpAnalyzer, ImageAnalyzer, TranscriptAnalyzer};
use diascreen::camera::FileFrameSource;
use diascreen::capture::StaticFormSource;
use diascreen::manifest::SessionManifest;
use diascreen::{
    Advance, AuthState, EventFilter, NavPhase, ScreeningConfig, ScreeningError, ScreeningFlow,
    ScreeningFlowBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "diascreen")]
#[command(about = "Diabetes screening session runner")]
#[command(version)]
#[command(long_about = "Runs a diabetes screening session end to end: questionnaire, wearable \
data, skin, body, metabolic and eye image analysis, and a medical transcript, then stores the \
report with the report API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "diascreen.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Session manifest to run
    #[arg(short, long, value_name = "FILE", help = "TOML manifest with the inputs of one session")]
    manifest: Option<PathBuf>,

    /// User the report is stored for, overrides the manifest
    #[arg(short, long, help = "Signed-in user id")]
    user: Option<String>,

    /// Probe analyzer health endpoints and exit
    #[arg(long, help = "Check every configured analyzer health endpoint and exit")]
    check_health: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - wire the session but capture nothing
    #[arg(long, help = "Build the screening flow and exit without capturing")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting diascreen v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ScreeningConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if args.check_health {
        let healthy = check_health(&config).await?;
        std::process::exit(if healthy { 0 } else { 1 });
    }

    if args.dry_run {
        let auth = AuthState::signed_in(args.user.as_deref().unwrap_or("dry-run"), &config.auth.sign_in_url);
        let flow = ScreeningFlowBuilder::from_config(
            &config,
            Arc::new(FileFrameSource::new()),
            Arc::new(StaticFormSource::new()),
        )?
        .start(&auth)?;
        println!(
            "✓ Dry run completed - session {} with {} steps wired",
            flow.snapshot().session_id(),
            flow.snapshot().registry().len()
        );
        return Ok(());
    }

    let Some(manifest_path) = args.manifest.as_ref() else {
        eprintln!("Nothing to do: pass --manifest, --check-health or --dry-run");
        std::process::exit(2);
    };

    let manifest = SessionManifest::load(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let user = args.user.clone().or_else(|| manifest.user.clone());
    let auth = match user {
        Some(user) => AuthState::signed_in(user, &config.auth.sign_in_url),
        None => AuthState::signed_out(&config.auth.sign_in_url),
    };

    let flow = match ScreeningFlowBuilder::from_config(
        &config,
        Arc::new(manifest.frame_source()),
        Arc::new(manifest.form_source()?),
    )?
    .start(&auth)
    {
        Ok(flow) => flow,
        Err(ScreeningError::Unauthenticated { redirect }) => {
            eprintln!("✗ No user signed in, sign in at {}", redirect);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let progress = spawn_progress_printer(&flow);

    let outcome = tokio::select! {
        outcome = run_session(&flow) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling running capture");
            flow.cancel_captures();
            progress.abort();
            std::process::exit(130);
        }
    };
    progress.abort();

    match outcome {
        Ok(report_id) => {
            println!("✓ Screening stored as report {}", report_id);
            Ok(())
        }
        Err(e) => {
            error!("Screening session failed: {}", e);
            eprintln!("✗ Screening failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Capture each step in order, advance after each, submit after the last
async fn run_session(flow: &ScreeningFlow) -> diascreen::Result<diascreen::ReportId> {
    loop {
        let step = flow.snapshot().current_step();
        flow.capture_current().await?;

        match flow.next().await? {
            Advance::Moved(index) => info!("Step {} done, moving to step {}", step, index + 1),
            Advance::Submitted(report_id) => return Ok(report_id),
            Advance::Discarded(report_id) => {
                return Err(ScreeningError::system(format!(
                    "Session was reset while report {} was being stored",
                    report_id
                )))
            }
            Advance::Blocked => {
                return Err(ScreeningError::system(format!(
                    "Navigation blocked at {} ({})",
                    step,
                    flow.phase()
                )))
            }
        }
    }
}

fn spawn_progress_printer(flow: &ScreeningFlow) -> tokio::task::JoinHandle<()> {
    let mut receiver = flow.events().subscribe_filtered(
        EventFilter::EventTypes(vec!["step_recorded", "capture_failed", "phase_changed"]),
        "cli-progress",
    );

    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            if let diascreen::ScreeningEvent::PhaseChanged {
                phase: NavPhase::Advancing,
                ..
            } = event
            {
                continue;
            }
            println!("  {}", event.description());
        }
    })
}

async fn check_health(config: &ScreeningConfig) -> Result<bool> {
    let analyzer = HttpAnalyzer::new(&config.analyzers)?;
    let registry = config.registry()?;
    let mut healthy = true;

    for step in registry.iter().filter(|s| s.is_image_step()) {
        if !analyzer.has_health_probe(step) {
            println!("- {:<10} no health endpoint configured", step.as_str());
            continue;
        }
        match analyzer.health(step).await {
            Ok(()) => println!("✓ {:<10} available", step.as_str()),
            Err(e) => {
                healthy = false;
                println!("✗ {:<10} {}", step.as_str(), e);
            }
        }
    }

    let transcript =
        TranscriptAnalyzer::from_config(&config.transcript, config.analyzers.request_timeout())?;
    match transcript {
        Some(analyzer) if analyzer.has_health_probe() => match analyzer.health().await {
            Ok(()) => println!("✓ {:<10} available", "transcript"),
            Err(e) => {
                healthy = false;
                println!("✗ {:<10} {}", "transcript", e);
            }
        },
        Some(_) => println!("- {:<10} no health endpoint configured", "transcript"),
        None => {}
    }

    Ok(healthy)
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("diascreen={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "diascreen.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# diascreen configuration file");
    println!("# Every key is optional; DIASCREEN_<SECTION>__<KEY> environment variables override it");
    println!();
    let rendered = toml::to_string_pretty(&ScreeningConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}
