//! Channel pool that initializes every channel it creates.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::channel::{BrokerChannel, ChannelFactory};
use crate::config::PoolConfig;
use crate::error::MessagingError;
use crate::topology::ChannelInitializer;

type IdleList<C> = Mutex<Vec<(String, C)>>;

/// A bounded pool of broker channels.
///
/// A channel is initialized exactly once, right after the factory creates it.
/// Idle channels are handed out again without re-initialization. If the
/// initializer fails, the new channel is closed and the error is returned to
/// the caller; the pool never retries on its own.
pub struct ChannelPool<F: ChannelFactory> {
    factory: F,
    initializer: Arc<dyn ChannelInitializer>,
    config: PoolConfig,
    idle: IdleList<F::Channel>,
    semaphore: Semaphore,
    sequence: AtomicU64,
    initialized: AtomicU64,
}

impl<F: ChannelFactory> ChannelPool<F> {
    /// Create a pool with the given factory and initializer
    pub fn new(
        factory: F,
        initializer: Arc<dyn ChannelInitializer>,
        config: PoolConfig,
    ) -> Result<Self, MessagingError> {
        config.validate()?;

        info!(
            pool = %config.name,
            max_size = config.max_size,
            "Channel pool created"
        );

        Ok(Self {
            factory,
            initializer,
            semaphore: Semaphore::new(config.max_size),
            config,
            idle: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
            initialized: AtomicU64::new(0),
        })
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The channel factory
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Number of open channels waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of channels that completed initialization
    pub fn initialized_count(&self) -> u64 {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Number of free checkout slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Check out a channel, creating and initializing one if none is idle.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future while the initializer runs drops the new
    /// channel without calling [`BrokerChannel::close`]; closing is async and
    /// cannot happen in `Drop`. The channel never reaches the idle set and its
    /// permit is released, so the broker reclaims it when the connection goes.
    pub async fn acquire(&self) -> Result<PooledChannel<'_, F::Channel>, MessagingError> {
        let permit = self.acquire_permit().await?;

        if let Some((name, channel)) = self.take_idle() {
            debug!(pool = %self.config.name, channel = %name, "Reusing idle channel");
            return Ok(PooledChannel::new(name, channel, &self.idle, permit));
        }

        let name = format!(
            "{}-{}",
            self.config.name,
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        );
        let channel = self.factory.create_channel().await?;
        debug!(pool = %self.config.name, channel = %name, "Channel created");

        if let Err(e) = self.initializer.initialize(&channel, &name).await {
            warn!(
                pool = %self.config.name,
                channel = %name,
                error = %e,
                "Channel initialization failed, discarding channel"
            );
            if let Err(close_err) = channel.close().await {
                debug!(channel = %name, error = %close_err, "Error closing discarded channel");
            }
            return Err(e);
        }

        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(PooledChannel::new(name, channel, &self.idle, permit))
    }

    /// Close idle channels and refuse further checkouts.
    pub async fn close(&self) {
        self.semaphore.close();
        let idle: Vec<_> = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        info!(pool = %self.config.name, idle = idle.len(), "Closing channel pool");
        for (name, channel) in idle {
            if let Err(e) = channel.close().await {
                warn!(channel = %name, error = %e, "Error closing channel");
            }
        }
    }

    async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>, MessagingError> {
        let acquire = self.semaphore.acquire();
        let result = match self.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                warn!(pool = %self.config.name, ?timeout, "Timed out waiting for a channel");
                MessagingError::Timeout(format!(
                    "no channel available in pool '{}' after {:?}",
                    self.config.name, timeout
                ))
            })?,
            None => acquire.await,
        };
        result.map_err(|_| {
            MessagingError::ChannelClosed(format!("pool '{}' is closed", self.config.name))
        })
    }

    fn take_idle(&self) -> Option<(String, F::Channel)> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some((name, channel)) = idle.pop() {
            if channel.is_open() {
                return Some((name, channel));
            }
            debug!(channel = %name, "Dropping closed idle channel");
        }
        None
    }
}

/// RAII guard for a checked-out channel.
///
/// On drop the channel goes back to the pool if it is still open.
pub struct PooledChannel<'a, C: BrokerChannel> {
    name: String,
    channel: Option<C>,
    idle: &'a IdleList<C>,
    _permit: SemaphorePermit<'a>,
}

impl<'a, C: BrokerChannel> PooledChannel<'a, C> {
    fn new(name: String, channel: C, idle: &'a IdleList<C>, permit: SemaphorePermit<'a>) -> Self {
        Self {
            name,
            channel: Some(channel),
            idle,
            _permit: permit,
        }
    }

    /// Name the channel was initialized with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the channel instead of returning it to the pool
    pub async fn discard(mut self) -> Result<(), MessagingError> {
        match self.channel.take() {
            Some(channel) => {
                debug!(channel = %self.name, "Discarding channel");
                channel.close().await
            }
            None => Ok(()),
        }
    }
}

impl<C: BrokerChannel> Deref for PooledChannel<'_, C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the channel, and both consume the guard.
        self.channel
            .as_ref()
            .expect("pooled channel accessed after release")
    }
}

impl<C: BrokerChannel> Drop for PooledChannel<'_, C> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take()
            && channel.is_open()
        {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((std::mem::take(&mut self.name), channel));
        }
    }
}
