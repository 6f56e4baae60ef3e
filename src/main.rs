use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use almanac::app::AppContext;
use almanac::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Add {
            url,
            name,
            id,
            interval,
            color,
        } => {
            commands::add_source(&ctx, &url, name, id, interval, color).await?;
        }
        Commands::Remove { id } => {
            commands::remove_source(&ctx, &id).await?;
        }
        Commands::Enable { id } => {
            commands::enable_source(&ctx, &id).await?;
        }
        Commands::Disable { id } => {
            commands::disable_source(&ctx, &id).await?;
        }
        Commands::List => {
            commands::list_sources(&ctx)?;
        }
        Commands::Sync => {
            commands::sync_once(&ctx).await?;
        }
        Commands::Run => {
            commands::run(&ctx).await?;
        }
    }

    Ok(())
}
