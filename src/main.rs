use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    git_checkout::run().await
}
