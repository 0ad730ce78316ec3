use std::process::ExitCode;

use clap::Parser;
use verse_cli::{Cli, commands, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json);
    tracing::info!("starting verse-check v{}", env!("CARGO_PKG_VERSION"));
    commands::run(cli).await
}
