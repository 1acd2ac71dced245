mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse().with_global_flags();
    let verbose = cli.verbose;

    // RUST_LOG wins; otherwise --verbose turns on debug output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(cli).await {
        eprintln!("✗ {}", e);
        if verbose {
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
        }
        std::process::exit(1);
    }
}
