use anyhow::{Context, Result};
use boundcall::call::CallOutcome;
use boundcall::config::Config;
use boundcall::metrics;
use boundcall::transport::CallRequest;
use boundcall::{Error, RemoteConnector};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for "try again later" (sysexits EX_TEMPFAIL)
const EXIT_TEMPFAIL: u8 = 75;

/// Exit code for a permanent rejection
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "boundcall",
    version,
    about = "Issue cancellable, time-bounded calls against a remote service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file; BOUNDCALL_* environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the configured service is reachable
    Check {
        /// Path to probe, relative to the configured base path
        #[arg(long, default_value = "/")]
        probe: String,
    },

    /// Issue a single bounded call and report its classified outcome
    Call {
        /// Path relative to the base path, or an absolute URL
        path: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra header, as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed");
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let mut connector = RemoteConnector::new(&config);

    let code = match cli.command {
        Commands::Check { probe } => {
            tracing::info!(probe = %probe, "Starting check command");
            let status = connector.check(&probe, &cancel).await;
            println!("{status}");
            if status == "Connection working" {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Call {
            path,
            method,
            headers,
            data,
        } => {
            tracing::info!(path = %path, method = %method, "Starting call command");
            let request = build_request(&method, &path, &headers, data)?;
            report(connector.call(request, &cancel).await)?
        }
    };

    connector.disconnect();

    if cli.metrics {
        match metrics::encode_metrics() {
            Ok(text) => print!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }

    Ok(code)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("boundcall=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("boundcall={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Cancel the in-flight call on Ctrl-C
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight call");
            cancel.cancel();
        }
    });
}

fn build_request(
    method: &str,
    path: &str,
    headers: &[String],
    data: Option<String>,
) -> Result<CallRequest> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {method}"))?;

    let mut request = CallRequest::new(method, path);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header must look like \"Name: value\": {header}"))?;
        request = request.header(name.trim(), value.trim())?;
    }

    if let Some(data) = data {
        request = request.body(data);
    }

    Ok(request)
}

fn format_epoch_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn report(result: boundcall::Result<CallOutcome>) -> Result<ExitCode> {
    match result {
        Ok(CallOutcome::Success { status, body }) => {
            eprintln!("HTTP {status} ({} bytes, {})", body.raw().len(), body.charset());
            println!("{}", body.text());
            Ok(ExitCode::SUCCESS)
        }
        Ok(CallOutcome::PermanentFailure {
            status,
            reason,
            description,
        }) => {
            eprintln!("Rejected ({reason:?}, HTTP {status}): {description}");
            Ok(ExitCode::from(EXIT_REJECTED))
        }
        Ok(CallOutcome::RetryableFailure {
            window,
            description,
        }) => {
            eprintln!("Temporarily failed: {description}");
            eprintln!("  retry not before: {}", format_epoch_ms(window.not_before_ms));
            eprintln!("  give up after:    {}", format_epoch_ms(window.not_after_ms));
            Ok(ExitCode::from(EXIT_TEMPFAIL))
        }
        Err(e) if e.is_interrupted() => {
            eprintln!("Interrupted");
            Ok(ExitCode::from(130))
        }
        Err(e @ Error::Config(_)) => Err(e).context("Invalid session configuration"),
        Err(e) => Err(e.into()),
    }
}
