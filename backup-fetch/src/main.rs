use anyhow::Result;
use backup_fetch::cli::{run, Cli};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let report = run(cli).await?;
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
