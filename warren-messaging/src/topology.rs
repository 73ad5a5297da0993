//! Channel initialization: declaring the routing topology on new channels.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, info};

use crate::channel::BrokerChannel;
use crate::config::TopologyConfig;
use crate::error::MessagingError;

/// Runs once on every channel a pool creates, before the channel is handed out.
///
/// The channel reference is only valid for the duration of the call. Errors are
/// returned to the pool, which discards the channel.
#[async_trait]
pub trait ChannelInitializer: Send + Sync + 'static {
    /// Prepare a freshly created channel. `name` is for diagnostics only.
    async fn initialize(
        &self,
        channel: &dyn BrokerChannel,
        name: &str,
    ) -> Result<(), MessagingError>;
}

/// Declares an exchange, a queue, and a binding keyed by the queue name.
///
/// No local state records whether the topology exists: each call issues the
/// three declarations again and relies on the broker to treat identical
/// re-declarations as no-ops.
#[derive(Debug, Clone, Default)]
pub struct TopologyInitializer {
    topology: TopologyConfig,
}

impl TopologyInitializer {
    /// Create an initializer for the given topology
    pub fn new(topology: TopologyConfig) -> Result<Self, MessagingError> {
        topology.validate()?;
        Ok(Self { topology })
    }

    /// The topology this initializer declares
    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }
}

#[async_trait]
impl ChannelInitializer for TopologyInitializer {
    async fn initialize(
        &self,
        channel: &dyn BrokerChannel,
        name: &str,
    ) -> Result<(), MessagingError> {
        let exchange = &self.topology.exchange;
        let queue = &self.topology.queue;
        let routing_key = self.topology.routing_key();

        debug!(channel = name, exchange = %exchange.name, kind = %exchange.kind, "Declaring exchange");
        channel.declare_exchange(exchange).await?;

        debug!(channel = name, queue = %queue.name, "Declaring queue");
        channel.declare_queue(queue).await?;

        debug!(
            channel = name,
            queue = %queue.name,
            exchange = %exchange.name,
            routing_key = routing_key,
            "Binding queue to exchange"
        );
        channel
            .bind_queue(&queue.name, &exchange.name, routing_key)
            .await?;

        info!(
            channel = name,
            exchange = %exchange.name,
            queue = %queue.name,
            "Topology declared"
        );
        Ok(())
    }
}

/// Function-based channel initializer
pub struct FnInitializer<F>(pub F);

#[async_trait]
impl<F> ChannelInitializer for FnInitializer<F>
where
    F: for<'a> Fn(&'a dyn BrokerChannel, &'a str) -> BoxFuture<'a, Result<(), MessagingError>>
        + Send
        + Sync
        + 'static,
{
    async fn initialize(
        &self,
        channel: &dyn BrokerChannel,
        name: &str,
    ) -> Result<(), MessagingError> {
        (self.0)(channel, name).await
    }
}

/// Runs several initializers in registration order, stopping at the first error.
#[derive(Clone, Default)]
pub struct InitializerChain {
    initializers: Vec<Arc<dyn ChannelInitializer>>,
}

impl InitializerChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an initializer
    pub fn with(mut self, initializer: impl ChannelInitializer) -> Self {
        self.initializers.push(Arc::new(initializer));
        self
    }

    /// Append a shared initializer
    pub fn push(&mut self, initializer: Arc<dyn ChannelInitializer>) {
        self.initializers.push(initializer);
    }

    /// Number of registered initializers
    pub fn len(&self) -> usize {
        self.initializers.len()
    }

    /// Whether the chain has no initializers
    pub fn is_empty(&self) -> bool {
        self.initializers.is_empty()
    }
}

impl fmt::Debug for InitializerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializerChain")
            .field("len", &self.initializers.len())
            .finish()
    }
}

#[async_trait]
impl ChannelInitializer for InitializerChain {
    async fn initialize(
        &self,
        channel: &dyn BrokerChannel,
        name: &str,
    ) -> Result<(), MessagingError> {
        for initializer in &self.initializers {
            initializer.initialize(channel, name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExchangeConfig, QueueConfig};
    use std::sync::Mutex;

    /// Records calls and fails the operation named in `fail_on`.
    #[derive(Default)]
    struct RecordingChannel {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingChannel {
        fn failing(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Default::default()
            }
        }

        fn record(&self, op: &'static str, detail: String) -> Result<(), MessagingError> {
            self.calls.lock().unwrap().push(format!("{op} {detail}"));
            if self.fail_on == Some(op) {
                return Err(MessagingError::BrokerUnavailable("connection reset".into()));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerChannel for RecordingChannel {
        async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError> {
            self.record(
                "exchange.declare",
                format!("{} {} durable={}", config.name, config.kind, config.durable),
            )
        }

        async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError> {
            self.record(
                "queue.declare",
                format!(
                    "{} durable={} exclusive={} auto_delete={}",
                    config.name, config.durable, config.exclusive, config.auto_delete
                ),
            )
        }

        async fn bind_queue(
            &self,
            queue: &str,
            exchange: &str,
            routing_key: &str,
        ) -> Result<(), MessagingError> {
            self.record("queue.bind", format!("{queue} {exchange} {routing_key}"))
        }

        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            _body: &[u8],
        ) -> Result<(), MessagingError> {
            self.record("basic.publish", format!("{exchange} {routing_key}"))
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn close(&self) -> Result<(), MessagingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_declares_exchange_queue_and_binding_in_order() {
        let channel = RecordingChannel::default();
        TopologyInitializer::default()
            .initialize(&channel, "warren-1")
            .await
            .unwrap();

        assert_eq!(
            channel.calls(),
            vec![
                "exchange.declare micronaut direct durable=true",
                "queue.declare analytics durable=true exclusive=false auto_delete=false",
                "queue.bind analytics micronaut analytics",
            ]
        );
    }

    #[tokio::test]
    async fn test_exchange_failure_short_circuits() {
        let channel = RecordingChannel::failing("exchange.declare");
        let err = TopologyInitializer::default()
            .initialize(&channel, "warren-1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MessagingError::BrokerUnavailable("connection reset".into())
        );
        assert_eq!(channel.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_failure_skips_binding() {
        let channel = RecordingChannel::failing("queue.declare");
        let result = TopologyInitializer::default()
            .initialize(&channel, "warren-1")
            .await;

        assert!(result.is_err());
        assert_eq!(channel.calls().len(), 2);
        assert!(!channel.calls().iter().any(|c| c.starts_with("queue.bind")));
    }

    #[test]
    fn test_new_rejects_reserved_names() {
        let err = TopologyInitializer::new(TopologyConfig::new("amq.topic", "analytics"))
            .unwrap_err();
        assert!(matches!(err, MessagingError::Configuration(_)));
    }

    fn declare_audit_queue<'a>(
        channel: &'a dyn BrokerChannel,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<(), MessagingError>> {
        Box::pin(async move { channel.declare_queue(&QueueConfig::durable("audit")).await })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let chain = InitializerChain::new()
            .with(TopologyInitializer::default())
            .with(FnInitializer(declare_audit_queue));
        assert_eq!(chain.len(), 2);

        let channel = RecordingChannel::default();
        chain.initialize(&channel, "warren-1").await.unwrap();

        let calls = channel.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[3].starts_with("queue.declare audit"));
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_error() {
        let chain = InitializerChain::new()
            .with(TopologyInitializer::default())
            .with(FnInitializer(declare_audit_queue));

        let channel = RecordingChannel::failing("queue.bind");
        assert!(chain.initialize(&channel, "warren-1").await.is_err());
        assert_eq!(channel.calls().len(), 3);
    }
}
