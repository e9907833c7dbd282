use anyhow::Result;
use sbx_cli::{Cli, Commands, Parser};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => args.run(&cli.global).await,
        Commands::Validate(args) => args.run().await,
        Commands::Orphans { subcommand } => subcommand.run(&cli.global).await,
        Commands::Monitor(args) => args.run(&cli.global).await,
        Commands::Profile(args) => args.run().await,
    }
}
