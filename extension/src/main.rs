use std::process::ExitCode;

use rewrite_lib::Extension;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let extension = match Extension::bootstrap() {
        Ok(extension) => extension,
        Err(err) => {
            error!("failed to start rewrite extension: {err}");
            eprintln!("failed to start rewrite extension: {err}");
            return ExitCode::FAILURE;
        }
    };

    match extension.usage_summary().await {
        Some(summary) => {
            info!(
                used = summary.used,
                limit = summary.limit,
                percentage = summary.percentage,
                "{}",
                summary.reset_label
            );
            println!(
                "Usage: {}/{} ({:.0}%). {}",
                summary.used, summary.limit, summary.percentage, summary.reset_label
            );
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}
