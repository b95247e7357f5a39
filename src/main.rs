use clap::Parser;
use stepflow::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration is loaded first so the log settings can come from it
    let config = cli.load_config()?;
    cli.init_logging(&config)?;

    cli.execute(&config).await?;

    Ok(())
}
