use clap::error::ErrorKind;
use clap::Parser;
use envconfig::Envconfig;

use analytics_core::config::Config;
use e2e_cli::outcome::RunOutcome;

/// Sends sequences of analytics events and prints one JSON result line.
#[derive(Parser, Debug)]
#[command(name = "e2e-cli", version)]
struct Cli {
    /// JSON payload with writeKey, apiHost, sequences and optional config
    #[arg(long)]
    input: Option<String>,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr, stdout only carries the result.
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::WARN.into())
                .from_env_lossy(),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let outcome = match (Cli::try_parse(), Config::init_from_env()) {
        (Err(e), _) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        (Err(e), _) => RunOutcome::failed(e.to_string()),
        (Ok(_), Err(e)) => RunOutcome::failed(format!("invalid configuration: {e}")),
        (Ok(cli), Ok(config)) => e2e_cli::execute(cli.input.as_deref(), &config).await,
    };

    println!("{outcome}");
}
