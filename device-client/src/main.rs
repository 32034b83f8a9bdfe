use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

mod api_client;
mod polling;

use api_client::ApiClient;

#[derive(Parser)]
#[command(name = "device-client")]
#[command(about = "Signs a headless client in through the device authorization flow")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start a device flow and wait until someone approves it
    Login {
        /// Base URL of the backend (e.g., http://localhost:4000)
        #[arg(long)]
        base_url: String,

        /// Print only the token's expiry instead of the token itself
        #[arg(long)]
        quiet_token: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    match cli.command {
        Command::Login {
            base_url,
            quiet_token,
        } => login(base_url, quiet_token).await,
    }
}

async fn login(base_url: String, quiet_token: bool) -> Result<()> {
    let api = ApiClient::new(reqwest::Client::new(), base_url);

    println!("{} Starting device flow...", "→".blue());
    let started = api.start().await?;

    println!(
        "\n  Enter code {} at {}\n",
        started.user_code.bright_white().bold(),
        started
            .verification_url
            .as_deref()
            .unwrap_or(&started.verification_path)
            .underline()
    );
    println!(
        "{} Waiting for approval (expires in {}s)...",
        "→".blue(),
        started.expires_in
    );

    match polling::wait_for_token(&api, &started).await {
        Ok(token) => {
            println!("{} Approved", "✓".green());
            if quiet_token {
                match token.expires_at {
                    Some(expires_at) => println!("Token expires at {expires_at}"),
                    None => println!("Token has no expiry"),
                }
            } else {
                println!("{}", token.access_token);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}
