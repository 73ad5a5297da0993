//! Traits at the broker boundary.

use async_trait::async_trait;

use crate::config::{ExchangeConfig, QueueConfig};
use crate::error::MessagingError;

/// A logical channel to a message broker.
///
/// Every method maps to exactly one protocol operation. Implementations must
/// not retry or swallow broker errors.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange.
    async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError>;

    /// Declare a queue.
    async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError>;

    /// Bind a queue to an exchange.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError>;

    /// Publish raw bytes. An empty exchange name targets the default exchange.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError>;

    /// Whether the channel can still carry operations.
    fn is_open(&self) -> bool;

    /// Close the channel.
    async fn close(&self) -> Result<(), MessagingError>;
}

/// Creates fresh low-level channels for a pool.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// The channel type produced.
    type Channel: BrokerChannel + 'static;

    /// Open a new channel.
    async fn create_channel(&self) -> Result<Self::Channel, MessagingError>;
}
