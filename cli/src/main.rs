use backlink_cli::Cli;
use backlink_cli::run_main;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_main(Cli::parse()).await
}
