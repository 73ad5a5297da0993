//! Testing utilities for Warren.
//!
//! This crate provides an in-memory AMQP broker that stands in for RabbitMQ
//! when testing channel initializers and pools.
//!
//! ## Features
//!
//! - 🐇 **InMemoryBroker** - Exchanges, queues, bindings and routing in process memory
//! - 📡 **InMemoryChannel** - `BrokerChannel` implementation with AMQP channel-exception semantics
//! - 👁️ **Operation log** - Every protocol call the broker received, per channel
//! - 💥 **Fault injection** - Unreachable broker and one-shot operation failures
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use warren_messaging::prelude::*;
//! use warren_testing::InMemoryBroker;
//!
//! # tokio_test::block_on(async {
//! let broker = InMemoryBroker::new();
//! let pool = ChannelPool::new(
//!     broker.clone(),
//!     Arc::new(TopologyInitializer::default()),
//!     PoolConfig::default(),
//! )
//! .unwrap();
//!
//! let channel = pool.acquire().await.unwrap();
//! channel.publish("micronaut", "analytics", b"hello").await.unwrap();
//!
//! assert_eq!(broker.messages("analytics"), vec![b"hello".to_vec()]);
//! # });
//! ```
//!
//! ## Fault Injection
//!
//! ```
//! use warren_messaging::prelude::*;
//! use warren_testing::{InMemoryBroker, Operation};
//!
//! # tokio_test::block_on(async {
//! let broker = InMemoryBroker::new();
//! broker.fail_next(
//!     Operation::DeclareExchange,
//!     MessagingError::BrokerUnavailable("connection reset".into()),
//! );
//!
//! let channel = broker.channel().unwrap();
//! let err = TopologyInitializer::default()
//!     .initialize(&channel, "analytics-1")
//!     .await
//!     .unwrap_err();
//!
//! assert!(err.is_retryable());
//! assert_eq!(broker.operation_count(Operation::DeclareQueue), 0);
//! # });
//! ```

mod broker;
mod channel;

pub use broker::{Binding, InMemoryBroker, Operation, RecordedCall, routes};
pub use channel::InMemoryChannel;
