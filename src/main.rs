use clap::Parser;

use retouch::cli::{self, Cli, Command};
use retouch::{config, logging, server};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if matches!(cli.command, Some(Command::Version)) {
        cli::handle_version();
        return Ok(());
    }

    let config = config::load(cli.config.as_deref())?;
    logging::init_tracing(&config.logging)?;

    match cli.command {
        None | Some(Command::Start) => server::serve(&config).await?,
        Some(Command::Stage { locator }) => {
            if cli::handle_tool(&config, "stage_image", Some(&locator)).await? {
                std::process::exit(2);
            }
        }
        Some(Command::Enhance { locator }) => {
            if cli::handle_tool(&config, "enhance_image", locator.as_deref()).await? {
                std::process::exit(2);
            }
        }
        Some(Command::Config) => cli::handle_config_show(&config)?,
        Some(Command::Status { port, host }) => {
            cli::handle_status(&config, &host, port).await?
        }
        Some(Command::Version) => cli::handle_version(),
    }
    Ok(())
}
