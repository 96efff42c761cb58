use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use mcpman::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet by default: stdout is the stdio JSON-RPC transport, so all
    // logging goes to stderr and defaults to WARN unless overridden.
    let level = match cli.log_level.as_deref() {
        Some("off") => None,
        Some("error") => Some(Level::ERROR),
        Some("warn") | None => Some(Level::WARN),
        Some("info") => Some(Level::INFO),
        Some("debug") | Some("trace") => Some(Level::DEBUG),
        Some(other) => {
            eprintln!("[mcpman] unknown log level {other:?}, using warn");
            Some(Level::WARN)
        }
    };
    if let Some(level) = level {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    if let Some(dir) = &cli.config {
        // SAFETY: single-threaded at this point, before the tokio runtime
        // schedules any other task.
        unsafe {
            std::env::set_var(mcpman::config::CONFIG_DIR_ENV, dir);
        }
    }

    if let Err(e) = mcpman::cli::run().await {
        eprintln!("[mcpman] fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
