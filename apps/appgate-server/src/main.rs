mod app;
mod cli;
mod handlers;
mod server;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::app::App;
use crate::cli::Args;
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let args = Args::parse();

    init_telemetry(&args)?;

    info!("Starting appgate server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let result = run_application(args).await;

    if let Err(ref e) = result {
        error!("Application error: {:#}", e);
    }

    info!("Server shutdown complete");

    result
}

async fn run_application(args: Args) -> Result<()> {
    // Key and secret problems surface here, before the listener binds
    let app = App::build(&args)?;

    app.run().await?;

    Ok(())
}
