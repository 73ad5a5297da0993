//! # Warren Messaging
//!
//! Routing topology bootstrap for pooled AMQP channels.
//!
//! Broker clients that pool channels may open a fresh low-level channel many
//! times per process (after a connection drop, when the pool grows). This
//! crate declares the exchange, queue and binding a publish/subscribe flow
//! needs on every such channel, and leaves deduplication to the broker.
//!
//! - [`TopologyInitializer`] issues exactly one `exchange.declare`, one
//!   `queue.declare` and one `queue.bind` per call.
//! - [`ChannelPool`] runs a [`ChannelInitializer`] once for every channel it
//!   creates and discards the channel if initialization fails.
//! - [`BrokerChannel`] and [`ChannelFactory`] are the seams to the broker.
//!
//! ## Features
//!
//! - `rabbitmq` - RabbitMQ/AMQP support via lapin
//! - `full` - All backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warren_messaging::prelude::*;
//! use warren_messaging::rabbitmq::RabbitMqConnection;
//!
//! async fn example() -> Result<(), MessagingError> {
//!     let connection = RabbitMqConnection::connect(&RabbitMqConfig::default()).await?;
//!     let initializer = TopologyInitializer::new(TopologyConfig::new("micronaut", "analytics"))?;
//!     let pool = ChannelPool::new(connection, Arc::new(initializer), PoolConfig::default())?;
//!
//!     let channel = pool.acquire().await?;
//!     channel.publish("micronaut", "analytics", b"{\"isbn\":\"1491950358\"}").await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod pool;
pub mod topology;

#[cfg(feature = "rabbitmq")]
pub mod rabbitmq;

pub use channel::{BrokerChannel, ChannelFactory};
pub use config::*;
pub use error::MessagingError;
pub use pool::{ChannelPool, PooledChannel};
pub use topology::{ChannelInitializer, FnInitializer, InitializerChain, TopologyInitializer};

/// Prelude for common imports
pub mod prelude {
    pub use crate::channel::{BrokerChannel, ChannelFactory};
    pub use crate::config::{
        ExchangeConfig, ExchangeKind, PoolConfig, QueueConfig, RabbitMqConfig, TopologyConfig,
    };
    pub use crate::error::MessagingError;
    pub use crate::pool::{ChannelPool, PooledChannel};
    pub use crate::topology::{
        ChannelInitializer, FnInitializer, InitializerChain, TopologyInitializer,
    };
}
