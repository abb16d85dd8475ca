//! phishnet - Main Entry Point

use clap::Parser;
use phishnet::cli::{cmd_predict, cmd_push, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishnet=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Train => {
            // Stages do blocking IO
            let path = cli.config.clone();
            tokio::task::spawn_blocking(move || cmd_train(path.as_deref())).await??;
        }
        Commands::Push { csv } => {
            cmd_push(config, &csv)?;
        }
        Commands::Predict { url, model_dir } => {
            cmd_predict(config, &url, model_dir.as_deref())?;
        }
        Commands::Serve { host, port, model_dir } => {
            cmd_serve(config, host, port, model_dir).await?;
        }
    }

    Ok(())
}
