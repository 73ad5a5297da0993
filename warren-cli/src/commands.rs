//! Command implementations.

use std::sync::Arc;

use colored::Colorize;
use tracing::{debug, info, warn};
use warren_messaging::prelude::*;
use warren_messaging::rabbitmq::RabbitMqConnection;

use crate::config::WarrenConfig;
use crate::error::CliResult;

/// Connect and build a pool whose channels declare the configured topology.
async fn open_pool(config: &WarrenConfig) -> CliResult<ChannelPool<RabbitMqConnection>> {
    let initializer = TopologyInitializer::new(config.topology.clone())?;
    let connection = RabbitMqConnection::connect(&config.rabbitmq).await?;
    Ok(ChannelPool::new(
        connection,
        Arc::new(initializer),
        config.pool.clone(),
    )?)
}

async fn shutdown(pool: ChannelPool<RabbitMqConnection>) -> CliResult<()> {
    pool.close().await;
    pool.factory().close().await?;
    Ok(())
}

/// Combine an operation result with the shutdown that followed it.
///
/// The operation error wins. A shutdown error after a failed operation is
/// only logged.
fn settle<T>(result: CliResult<T>, closed: CliResult<()>) -> CliResult<T> {
    match (result, closed) {
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Error closing broker connection");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Ok(value), Ok(())) => Ok(value),
    }
}

/// Declare the exchange, queue and binding on a fresh channel.
pub async fn declare(config: &WarrenConfig) -> CliResult<()> {
    let pool = open_pool(config).await?;
    let result = pool.acquire().await.map(drop).map_err(Into::into);
    let closed = shutdown(pool).await;
    settle(result, closed)?;

    let topology = &config.topology;
    println!(
        "{} exchange {} ({}) -> queue {} [routing key: {}]",
        "Declared".green().bold(),
        topology.exchange.name.bright_cyan(),
        topology.exchange.kind,
        topology.queue.name.bright_cyan(),
        topology.routing_key(),
    );
    Ok(())
}

/// Publish one message to the configured exchange.
///
/// The routing key defaults to the queue name so the message lands in the
/// configured queue.
pub async fn publish(
    config: &WarrenConfig,
    payload: &str,
    routing_key: Option<&str>,
) -> CliResult<()> {
    let exchange = &config.topology.exchange.name;
    let routing_key = routing_key.unwrap_or_else(|| config.topology.routing_key());

    let pool = open_pool(config).await?;
    let result = async {
        let channel = pool.acquire().await?;
        debug!(channel = channel.name(), "Publishing on pooled channel");
        channel
            .publish(exchange, routing_key, payload.as_bytes())
            .await
    }
    .await
    .map_err(Into::into);
    let closed = shutdown(pool).await;
    settle(result, closed)?;

    info!(exchange = %exchange, routing_key = %routing_key, bytes = payload.len(), "Message published");
    println!(
        "{} {} bytes to {} [routing key: {}]",
        "Published".green().bold(),
        payload.len(),
        exchange.bright_cyan(),
        routing_key,
    );
    Ok(())
}

/// Print the effective configuration as TOML.
pub fn show_config(config: &WarrenConfig) -> CliResult<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
