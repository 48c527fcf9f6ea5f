//! CMS Fetcher CLI application
//!
//! Command-line interface for retrieving wind turbine vibration captures from
//! a condition-monitoring service and storing them as Parquet.

use std::process;

use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use cms_fetcher::cli::{
    handle_auth, handle_bucket, handle_config, handle_devices, handle_extract, handle_files,
    handle_ingest, Cli, CommandContext, Commands, ConfigAction,
};
use cms_fetcher::config::AppConfig;
use cms_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // `config init` must work even when the existing file is broken
    let writes_config = matches!(
        &cli.command,
        Commands::Config(args) if matches!(args.action, ConfigAction::Init { .. })
    );

    let ctx = if writes_config {
        init_logging(&cli, "info");
        None
    } else {
        let (config, source) = AppConfig::load_with_source(cli.global.config.as_deref()).await?;
        init_logging(&cli, &config.logging.level);
        if let Some(path) = &source {
            debug!("Using configuration from {}", path.display());
        }
        Some(CommandContext::new(config, source, cli.global.quiet)?)
    };

    info!("CMS Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let Some(ctx) = ctx else {
        return match cli.command {
            Commands::Config(args) => handle_config(args, None).await,
            _ => Ok(()),
        };
    };

    match cli.command {
        Commands::Ingest(args) => {
            info!("Executing ingest command");
            handle_ingest(args, &ctx).await
        }
        Commands::Devices => handle_devices(&ctx).await,
        Commands::Files(args) => handle_files(args, &ctx).await,
        Commands::Extract(args) => {
            info!("Executing extract command");
            handle_extract(args, &ctx).await
        }
        Commands::Bucket(args) => handle_bucket(args, &ctx).await,
        Commands::Auth(args) => handle_auth(args, &ctx).await,
        Commands::Config(args) => handle_config(args, Some(&ctx)).await,
    }
}

/// Initialize logging; `RUST_LOG` wins over flags and configuration
fn init_logging(cli: &Cli, configured_level: &str) {
    let level = cli
        .log_level()
        .map(|l| l.to_string().to_lowercase())
        .unwrap_or_else(|| configured_level.to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("cms_fetcher={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("cms_fetcher=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
