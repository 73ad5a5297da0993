//! Error types for broker operations

use thiserror::Error;

/// Result alias for broker operations
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors that can occur while declaring topology or publishing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The broker could not be reached at the transport level
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// An entity with the same name exists with different parameters
    #[error("Declaration conflict: {0}")]
    DeclarationConflict(String),

    /// The channel was closed, either by the client or by a broker exception
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Exchange or queue referenced by an operation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The broker refused access to a resource (e.g. reserved `amq.` names)
    #[error("Access refused: {0}")]
    AccessRefused(String),

    /// Resource exhausted (e.g., channel limit reached)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Failed to publish a message
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl MessagingError {
    /// Check if a fresh attempt on a new channel may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MessagingError::BrokerUnavailable(_)
                | MessagingError::ChannelClosed(_)
                | MessagingError::Timeout(_)
                | MessagingError::ResourceExhausted(_)
        )
    }

    /// Check if this error indicates a connection issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MessagingError::BrokerUnavailable(_) | MessagingError::ChannelClosed(_)
        )
    }

    /// Check if this error is a declaration conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, MessagingError::DeclarationConflict(_))
    }
}

#[cfg(feature = "rabbitmq")]
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        use lapin::protocol::{AMQPErrorKind, AMQPSoftError};

        match err.kind() {
            lapin::ErrorKind::IOError(_) => MessagingError::BrokerUnavailable(err.to_string()),
            lapin::ErrorKind::InvalidConnectionState(_) => {
                MessagingError::BrokerUnavailable(err.to_string())
            }
            lapin::ErrorKind::InvalidChannelState(..) => MessagingError::ChannelClosed(err.to_string()),
            lapin::ErrorKind::ChannelsLimitReached => {
                MessagingError::ResourceExhausted(err.to_string())
            }
            lapin::ErrorKind::ProtocolError(amqp) => match amqp.kind() {
                AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED) => {
                    MessagingError::DeclarationConflict(err.to_string())
                }
                AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND) => {
                    MessagingError::NotFound(err.to_string())
                }
                AMQPErrorKind::Soft(AMQPSoftError::ACCESSREFUSED) => {
                    MessagingError::AccessRefused(err.to_string())
                }
                _ => MessagingError::Other(err.to_string()),
            },
            _ => MessagingError::Other(err.to_string()),
        }
    }
}
