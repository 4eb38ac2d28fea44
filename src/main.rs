use clap::Parser;
use std::process::ExitCode;
use usersync::cli::{Cli, Commands};
use usersync::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Some(Commands::Login) => usersync::cli::login(&config).await,
        Some(Commands::Logout) => usersync::cli::logout(&config).await,
        None => usersync::cli::run(&config).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
