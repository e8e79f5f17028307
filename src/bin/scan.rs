use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use order_checker::cache::MessageCache;
use order_checker::config::AppConfig;
use order_checker::mail::{MailClientProvider, StaticTokenProvider};
use order_checker::report::build_report;
use order_checker::scan::{ScanRequest, ScanState};

#[derive(Parser, Debug)]
#[command(
    name = "scan",
    about = "Scan a mailbox for order notifications and print the report as JSON"
)]
struct Args {
    /// Trailing days to scan (clamped to the configured maximum).
    #[arg(long)]
    days: Option<u32>,

    /// Mailbox to scan.
    #[arg(long, default_value = "me")]
    user: String,

    /// Drop cached extraction results before scanning.
    #[arg(long)]
    clear_cache: bool,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env();

    let cache = Arc::new(MessageCache::open(&config.cache.path, config.cache.ttl).await?);
    let scans = order_checker::scan_service(&config, cache);

    let provider = StaticTokenProvider::new(config.gmail.clone());
    let client = provider.mail_client(&args.user).await?;

    let handle = scans.start(
        client,
        ScanRequest {
            user: args.user.clone(),
            days: args.days,
            clear_cache: args.clear_cache,
        },
    )?;
    let progress = handle.wait().await;

    let snapshot = scans.results()?;
    let report = build_report(
        &snapshot,
        progress.total_messages,
        progress.days.unwrap_or(config.window.default_days),
        Utc::now().date_naive(),
    );
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)?;
            log::info!("report written to {}", path.display());
        }
        None => writeln!(io::stdout(), "{json}")?,
    }

    if progress.state != ScanState::Completed {
        writeln!(
            io::stderr(),
            "error: scan ended {:?}: {}",
            progress.state,
            progress.error.as_deref().unwrap_or("unknown error")
        )?;
        std::process::exit(1);
    }

    Ok(())
}
