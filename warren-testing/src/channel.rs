// Channels onto the in-memory broker

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;
use warren_messaging::{BrokerChannel, ExchangeConfig, MessagingError, QueueConfig};

use crate::broker::{BrokerState, InMemoryBroker, Operation, RecordedCall};

/// A channel on an [`InMemoryBroker`].
///
/// Like an AMQP channel, it is closed by the first error the broker raises on
/// it; later calls fail with `ChannelClosed` and never reach the broker.
pub struct InMemoryChannel {
    id: u32,
    broker: InMemoryBroker,
    open: AtomicBool,
}

impl InMemoryChannel {
    pub(crate) fn new(id: u32, broker: InMemoryBroker) -> Self {
        Self {
            id,
            broker,
            open: AtomicBool::new(true),
        }
    }

    /// Channel number
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Operations this channel issued, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.broker
            .operations()
            .into_iter()
            .filter(|call| call.channel == self.id)
            .collect()
    }

    fn run<T>(
        &self,
        operation: Operation,
        target: &str,
        f: impl FnOnce(&mut BrokerState) -> Result<T, MessagingError>,
    ) -> Result<T, MessagingError> {
        if !self.is_open() {
            return Err(MessagingError::ChannelClosed(format!(
                "channel {} is closed",
                self.id
            )));
        }

        self.broker
            .apply(self.id, operation, target, f)
            .inspect_err(|e| {
                debug!(channel = self.id, error = %e, "Broker closed channel");
                self.open.store(false, Ordering::SeqCst);
            })
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError> {
        self.run(Operation::DeclareExchange, &config.name, |state| {
            state.declare_exchange(config)
        })
    }

    async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError> {
        self.run(Operation::DeclareQueue, &config.name, |state| {
            state.declare_queue(config)
        })
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        self.run(Operation::BindQueue, queue, |state| {
            state.bind_queue(queue, exchange, routing_key)
        })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        self.run(Operation::Publish, routing_key, |state| {
            state.publish(exchange, routing_key, body)
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}
