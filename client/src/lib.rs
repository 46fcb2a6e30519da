pub mod cli;
pub mod config;
mod content;
mod nodes;

use {
    anyhow::Result,
    cli::{Cli, Command},
    config::Config,
    nodecrypt_sdk::{CancellationToken, signal::cancel_on_shutdown},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, prelude::*},
};

/// `RUST_LOG` takes precedence over `log_filter` from the config.
pub fn setup_logger(log_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_filter)?,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
    Ok(())
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = tokio::spawn(cancel_on_shutdown(cancel.clone()));
    let result = tokio::task::spawn_blocking(move || handle_command(cli.command, &config, &cancel))
        .await?;
    shutdown.abort();
    result
}

fn handle_command(command: Command, config: &Config, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Encrypt { input, output } => {
            content::encrypt(&input, &output, config.spool_in_memory()?, cancel)?;
        }
        Command::Decrypt { input, output, key } => {
            content::decrypt(&input, &output, &key, cancel)?;
        }
        Command::Fingerprint { path } => {
            content::fingerprint(&path)?;
        }
        Command::Tree {
            nodes: listing,
            link,
            all,
        } => {
            let tree = nodes::resolve(config, nodes::load_listing(&listing)?, link.as_ref())?;
            nodes::print_tree(&tree, all);
        }
        Command::Share {
            nodes: listing,
            node_id,
        } => {
            let tree = nodes::resolve(config, nodes::load_listing(&listing)?, None)?;
            if tree.inaccessible().next().is_some() {
                warn!("inaccessible nodes are left out of the share");
            }
            info!("{}", nodes::share(config, &tree, &node_id)?);
        }
        Command::Link { link } => nodes::describe_link(&link)?,
    }
    Ok(())
}
