use std::env;

use anyhow::Context as _;
use clap::{Parser, command};
use nodelock::license_enforcement::{
    self, IdentityResolver, LICENSE_CHECK_FAILED, LICENSE_CHECK_PASSED, LicenseChecker,
    VIOLATION_EXIT_STATUS,
};
use tokio::{
    select,
    signal::{
        self,
        unix::{SignalKind, signal},
    },
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run under license enforcement until interrupted
    ///
    /// Starts the background enforcement loop the same way an embedding
    /// application does, then idles until SIGINT or SIGTERM. A failed check
    /// exits the process with status 1.
    Run,

    /// Run a single license check and report the result
    Verify(VerifyCommand),

    /// Print the resolved device identifier
    Identity,
}

#[derive(Debug, clap::Args)]
struct VerifyCommand {
    /// Print the check report as JSON
    #[arg(long, env = "NODELOCK_JSON")]
    json: bool,
}

fn setup_logging() {
    use std::io::IsTerminal;
    use tracing_subscriber::{
        filter::{EnvFilter, LevelFilter},
        fmt,
    };

    let color = std::io::stderr().is_terminal()
        && (match env::var("COLORTERM") {
            Ok(value) => value == "truecolor" || value == "24bit",
            _ => false,
        } || match env::var("TERM") {
            Ok(value) => value == "direct" || value == "truecolor",
            _ => false,
        });

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // Diagnostics and reports go to stdout, so logs stay on stderr
    let fmt = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if color {
        fmt.event_format(fmt::format().pretty())
            .with_file(false)
            .with_line_number(false)
            .with_ansi(color)
            .init();
    } else {
        fmt.with_file(false)
            .with_line_number(false)
            .with_ansi(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Cli::parse();

    setup_logging();

    match opts.command {
        Commands::Run => run_under_enforcement().await?,
        Commands::Verify(verify_command) => handle_verify_command(verify_command).await?,
        Commands::Identity => handle_identity_command().await?,
    }

    Ok(())
}

async fn run_under_enforcement() -> anyhow::Result<()> {
    let handle = license_enforcement::check()?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    info!("Running under license enforcement");

    select! {
        _ = signal::ctrl_c() => info!("Received SIGINT, exiting"),
        _ = sigterm.recv() => info!("Received SIGTERM, exiting"),
        state = handle.wait() => {
            let state = state?;
            warn!(%state, "License enforcement stopped unexpectedly");
        },
    }

    Ok(())
}

async fn handle_verify_command(command: VerifyCommand) -> anyhow::Result<()> {
    let report = tokio::task::spawn_blocking(|| LicenseChecker::default().report())
        .await
        .context("License check task failed")?;

    info!("{report}");

    if command.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(violation) = &report.violation {
        println!("{LICENSE_CHECK_FAILED}: {violation}");
    } else {
        println!("{LICENSE_CHECK_PASSED}");
    }

    if !report.passed {
        std::process::exit(VIOLATION_EXIT_STATUS);
    }

    Ok(())
}

async fn handle_identity_command() -> anyhow::Result<()> {
    let identity = tokio::task::spawn_blocking(|| IdentityResolver::default().resolve())
        .await
        .context("Identity resolution task failed")?;

    if let Some(identity) = identity {
        println!("{identity}");
    } else {
        eprintln!("No device identifier available");
        std::process::exit(VIOLATION_EXIT_STATUS);
    }

    Ok(())
}
