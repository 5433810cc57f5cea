use clap::Parser;
use minion::Config;

/// Multi-tenant distributed cron-style job scheduler.
#[derive(Parser)]
#[command(name = "minion", version)]
struct Cli {
    /// Configuration file (MINION_CONFIG overrides with inline JSON)
    #[arg(long, default_value = "config/config.json")]
    config: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Config::load(&cli.config).unwrap_or_else(die);

    let default_level = match config.log_level.as_str() {
        "error" => "error",
        "warn" => "warn",
        "debug" => "debug",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!(org = %config.org, "starting minion");

    if let Err(e) = minion::api::serve(config).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

fn die<T>(e: impl std::fmt::Display) -> T {
    eprintln!("Error: {e}");
    std::process::exit(1);
}
