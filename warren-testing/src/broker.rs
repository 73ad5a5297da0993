// In-memory broker with AMQP 0-9-1 declaration and routing semantics

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use warren_messaging::{ChannelFactory, ExchangeConfig, ExchangeKind, MessagingError, QueueConfig};

use crate::channel::InMemoryChannel;

const RESERVED_PREFIX: &str = "amq.";
const DEFAULT_VHOST: &str = "/";

/// Protocol operations the broker records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `channel.open`
    OpenChannel,
    /// `exchange.declare`
    DeclareExchange,
    /// `queue.declare`
    DeclareQueue,
    /// `queue.bind`
    BindQueue,
    /// `basic.publish`
    Publish,
}

/// A queue-to-exchange binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    /// Bound queue
    pub queue: String,
    /// Source exchange
    pub exchange: String,
    /// Binding key
    pub routing_key: String,
}

/// One operation as received by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Channel the operation arrived on
    pub channel: u32,
    /// The operation
    pub operation: Operation,
    /// Entity name or routing target
    pub target: String,
}

struct QueueState {
    config: QueueConfig,
    messages: VecDeque<Vec<u8>>,
}

#[derive(Default)]
pub(crate) struct BrokerState {
    exchanges: HashMap<String, ExchangeConfig>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    operations: Vec<RecordedCall>,
    faults: HashMap<Operation, VecDeque<MessagingError>>,
    unreachable: bool,
    next_channel: u32,
}

impl BrokerState {
    /// Record an arriving operation and apply injected failures.
    fn admit(
        &mut self,
        channel: u32,
        operation: Operation,
        target: &str,
    ) -> Result<(), MessagingError> {
        self.operations.push(RecordedCall {
            channel,
            operation,
            target: target.to_string(),
        });
        if self.unreachable {
            return Err(MessagingError::BrokerUnavailable("connection refused".to_string()));
        }
        if let Some(err) = self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn declare_exchange(
        &mut self,
        config: &ExchangeConfig,
    ) -> Result<(), MessagingError> {
        if config.name.is_empty() || config.name.starts_with(RESERVED_PREFIX) {
            return Err(access_refused("exchange", &config.name));
        }

        match self.exchanges.get(&config.name) {
            Some(existing) => {
                if existing.kind != config.kind {
                    return Err(inequivalent(
                        "type",
                        "exchange",
                        &config.name,
                        config.kind.as_str(),
                        existing.kind.as_str(),
                    ));
                }
                if existing.durable != config.durable {
                    return Err(inequivalent_flag(
                        "durable",
                        "exchange",
                        &config.name,
                        config.durable,
                        existing.durable,
                    ));
                }
                if existing.auto_delete != config.auto_delete {
                    return Err(inequivalent_flag(
                        "auto_delete",
                        "exchange",
                        &config.name,
                        config.auto_delete,
                        existing.auto_delete,
                    ));
                }
                Ok(())
            }
            None => {
                debug!(exchange = %config.name, kind = %config.kind, "Exchange created");
                self.exchanges.insert(config.name.clone(), config.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn declare_queue(&mut self, config: &QueueConfig) -> Result<(), MessagingError> {
        if config.name.is_empty() {
            return Err(MessagingError::Configuration(
                "server-named queues are not supported".to_string(),
            ));
        }
        if config.name.starts_with(RESERVED_PREFIX) {
            return Err(access_refused("queue", &config.name));
        }

        match self.queues.get(&config.name) {
            Some(existing) => {
                let current = &existing.config;
                let flags = [
                    ("durable", config.durable, current.durable),
                    ("exclusive", config.exclusive, current.exclusive),
                    ("auto_delete", config.auto_delete, current.auto_delete),
                ];
                for (flag, received, current) in flags {
                    if received != current {
                        return Err(inequivalent_flag(
                            flag,
                            "queue",
                            &config.name,
                            received,
                            current,
                        ));
                    }
                }
                Ok(())
            }
            None => {
                debug!(queue = %config.name, "Queue created");
                self.queues.insert(
                    config.name.clone(),
                    QueueState {
                        config: config.clone(),
                        messages: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }

    pub(crate) fn bind_queue(
        &mut self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        if exchange.is_empty() {
            return Err(MessagingError::AccessRefused(
                "operation not permitted on the default exchange".to_string(),
            ));
        }
        if !self.queues.contains_key(queue) {
            return Err(not_found("queue", queue));
        }
        if !self.exchanges.contains_key(exchange) {
            return Err(not_found("exchange", exchange));
        }

        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !self.bindings.contains(&binding) {
            debug!(queue, exchange, routing_key, "Binding created");
            self.bindings.push(binding);
        }
        Ok(())
    }

    pub(crate) fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        let targets: Vec<String> = if exchange.is_empty() {
            self.queues
                .keys()
                .filter(|name| name.as_str() == routing_key)
                .cloned()
                .collect()
        } else {
            let kind = self
                .exchanges
                .get(exchange)
                .map(|e| e.kind)
                .ok_or_else(|| not_found("exchange", exchange))?;

            let mut seen = HashSet::new();
            self.bindings
                .iter()
                .filter(|b| b.exchange == exchange && routes(kind, &b.routing_key, routing_key))
                .filter(|b| seen.insert(b.queue.clone()))
                .map(|b| b.queue.clone())
                .collect()
        };

        if targets.is_empty() {
            debug!(exchange, routing_key, "Message unroutable, dropped");
        }
        for queue in targets {
            if let Some(state) = self.queues.get_mut(&queue) {
                state.messages.push_back(body.to_vec());
            }
        }
        Ok(())
    }
}

/// Whether a binding key accepts a routing key for the given exchange type
pub fn routes(kind: ExchangeKind, binding_key: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Direct => binding_key == routing_key,
        ExchangeKind::Fanout => true,
        ExchangeKind::Topic => {
            let pattern: Vec<&str> = binding_key.split('.').collect();
            let words: Vec<&str> = routing_key.split('.').collect();
            topic_matches(&pattern, &words)
        }
    }
}

fn topic_matches(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| topic_matches(rest, &words[skip..])),
        Some((&head, rest)) => match words.split_first() {
            Some((&word, remaining)) => {
                (head == "*" || head == word) && topic_matches(rest, remaining)
            }
            None => false,
        },
    }
}

fn access_refused(entity: &str, name: &str) -> MessagingError {
    MessagingError::AccessRefused(format!(
        "ACCESS_REFUSED - {} name '{}' contains reserved prefix '{}'",
        entity, name, RESERVED_PREFIX
    ))
}

fn not_found(entity: &str, name: &str) -> MessagingError {
    MessagingError::NotFound(format!(
        "NOT_FOUND - no {} '{}' in vhost '{}'",
        entity, name, DEFAULT_VHOST
    ))
}

fn inequivalent(
    arg: &str,
    entity: &str,
    name: &str,
    received: &str,
    current: &str,
) -> MessagingError {
    MessagingError::DeclarationConflict(format!(
        "PRECONDITION_FAILED - inequivalent arg '{}' for {} '{}' in vhost '{}': received '{}' but current is '{}'",
        arg, entity, name, DEFAULT_VHOST, received, current
    ))
}

fn inequivalent_flag(
    arg: &str,
    entity: &str,
    name: &str,
    received: bool,
    current: bool,
) -> MessagingError {
    inequivalent(arg, entity, name, &received.to_string(), &current.to_string())
}

/// A broker living in process memory.
///
/// Clones share state, so a test can keep one handle for inspection while a
/// pool owns another as its channel factory.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a channel
    pub fn channel(&self) -> Result<InMemoryChannel, MessagingError> {
        let id = {
            let mut state = self.state();
            state.next_channel += 1;
            let id = state.next_channel;
            state.admit(id, Operation::OpenChannel, "")?;
            id
        };
        Ok(InMemoryChannel::new(id, self.clone()))
    }

    /// Make every subsequent call fail as if the broker were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: MessagingError) {
        self.state()
            .faults
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Declare an exchange directly, bypassing channels (test setup)
    pub fn seed_exchange(&self, config: ExchangeConfig) {
        self.state().exchanges.insert(config.name.clone(), config);
    }

    /// Look up an exchange
    pub fn exchange(&self, name: &str) -> Option<ExchangeConfig> {
        self.state().exchanges.get(name).cloned()
    }

    /// Look up a queue
    pub fn queue(&self, name: &str) -> Option<QueueConfig> {
        self.state().queues.get(name).map(|q| q.config.clone())
    }

    /// All bindings, in creation order
    pub fn bindings(&self) -> Vec<Binding> {
        self.state().bindings.clone()
    }

    /// Messages waiting in a queue, oldest first
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state()
            .queues
            .get(queue)
            .map(|q| q.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return the oldest message in a queue
    pub fn take_message(&self, queue: &str) -> Option<Vec<u8>> {
        self.state()
            .queues
            .get_mut(queue)
            .and_then(|q| q.messages.pop_front())
    }

    /// Number of declared exchanges
    pub fn exchange_count(&self) -> usize {
        self.state().exchanges.len()
    }

    /// Number of declared queues
    pub fn queue_count(&self) -> usize {
        self.state().queues.len()
    }

    /// Number of bindings
    pub fn binding_count(&self) -> usize {
        self.state().bindings.len()
    }

    /// Every operation received, in arrival order
    pub fn operations(&self) -> Vec<RecordedCall> {
        self.state().operations.clone()
    }

    /// How many times an operation was received
    pub fn operation_count(&self, operation: Operation) -> usize {
        self.state()
            .operations
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub(crate) fn apply<T>(
        &self,
        channel: u32,
        operation: Operation,
        target: &str,
        f: impl FnOnce(&mut BrokerState) -> Result<T, MessagingError>,
    ) -> Result<T, MessagingError> {
        let mut state = self.state();
        state.admit(channel, operation, target)?;
        f(&mut *state)
    }
}

#[async_trait]
impl ChannelFactory for InMemoryBroker {
    type Channel = InMemoryChannel;

    async fn create_channel(&self) -> Result<Self::Channel, MessagingError> {
        self.channel()
    }
}
