//! blobstore-rs: self-contained blob storage service.

use clap::Parser;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use blobstore_rs::{Args, BlobServerBuilder, Config, LoggingTrigger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    // RUST_LOG, when set, overrides the level chosen by the flags.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Create configuration from arguments
    let config = Config::from(args);

    let mut builder = BlobServerBuilder::new().config(config.clone());
    for pattern in &config.triggers {
        builder = builder.trigger(pattern.clone(), Arc::new(LoggingTrigger));
    }
    let server = builder.build().await?;

    println!(
        r#"
Blob service is starting at {}

Storage: {}
Account key: {}

Press Ctrl+C to stop the server.
"#,
        server.base_url(),
        config
            .storage_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string()),
        if config.uses_development_key() {
            "development default"
        } else {
            "configured"
        },
    );

    if config.require_auth && config.uses_development_key() {
        warn!("Authentication is required but the well-known development key is in use; set --account-key");
    }

    server.run().await
}
