//! CLI entry point for the recording harvester.

use std::process::ExitCode;

mod app_config;
mod batch;
mod cli;
mod runtime;

#[tokio::main]
async fn main() -> ExitCode {
    match runtime::run_harvester().await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(runtime::ProcessExit::Failure.code())
        }
    }
}
