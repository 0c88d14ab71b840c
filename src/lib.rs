pub mod core;
pub mod git;

use std::process::ExitCode;

pub use crate::core::{CheckoutManager, CheckoutSettings, CheckoutSummary};
pub use crate::git::{GitCommandManager, GitError};

/// Process entry point for the `git-checkout` binary.
///
/// Reads `CHECKOUT_*` settings from the environment, runs the checkout and
/// prints the [`CheckoutSummary`] as JSON on stdout. Failures are logged
/// with their category and yield a non-zero exit status.
pub async fn run() -> ExitCode {
    // Initialize logger for RUST_LOG environment variable support
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match checkout().await {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Failed to serialize checkout summary: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            log::error!("{e}");
            log::debug!("error category: {:?}", e.category());
            ExitCode::FAILURE
        }
    }
}

async fn checkout() -> Result<CheckoutSummary, GitError> {
    let settings = CheckoutSettings::from_env()?;
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(json) = serde_json::to_string(&settings) {
            log::debug!("settings: {json}");
        }
    }

    log::info!(
        "Checking out {} into {}",
        settings.repository_url,
        settings.path.display()
    );
    CheckoutManager::new().checkout(&settings).await
}
