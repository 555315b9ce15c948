//! CLI entry point: load a plan document, run it, print the event stream

use anyhow::Context;
use clap::Parser;
use probe_engine::{EventSink, LogEvent, PlanRunner, ProbeClient, TestPlan};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sentryprobe", about = "Execute a security probe test plan")]
struct Args {
    /// Path to the test plan JSON document
    plan: PathBuf,

    /// Print events as JSON lines instead of human-readable text
    #[arg(long)]
    events_json: bool,

    /// Log level filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_target(true)
        .try_init();

    let raw = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("failed to read plan file {}", args.plan.display()))?;
    let plan = TestPlan::from_json(&raw).context("failed to decode test plan")?;

    let client = ProbeClient::new().context("failed to build HTTP client")?;
    let (sink, mut rx) = EventSink::channel();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if args.events_json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("event serialization failed: {e}"),
                }
            } else {
                print_event(&event);
            }
        }
    });

    PlanRunner::new(client).run(&plan, &sink).await;
    drop(sink);
    printer.await.context("event printer task failed")?;
    Ok(())
}

fn print_event(event: &LogEvent) {
    match event {
        LogEvent::Info { message } => println!("INFO  {message}"),
        LogEvent::Error { message } => println!("ERROR {message}"),
        LogEvent::Request { log } => {
            let status = log
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let blocked = if log.blocked { " BLOCKED" } else { "" };
            match &log.error {
                Some(error) => println!(
                    "REQ   {} {} -> {} ({}ms){} [{}]",
                    log.method, log.url, status, log.duration_ms, blocked, error
                ),
                None => println!(
                    "REQ   {} {} -> {} ({}ms){}",
                    log.method, log.url, status, log.duration_ms, blocked
                ),
            }
        }
        LogEvent::Summary { message, totals } => {
            let totals: Vec<String> = totals.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!("DONE  {message} [{}]", totals.join(", "));
        }
    }
}
