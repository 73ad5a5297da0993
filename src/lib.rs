// Warren - Routing topology bootstrap for pooled AMQP channels
//
// Every channel a pool opens runs an initializer that declares the exchange,
// queue and binding a publish/subscribe flow depends on. Declarations are
// idempotent on the broker, so repeating them per channel is safe.

// Re-export core functionality
pub use warren_messaging::*;

// Re-export optional crates
#[cfg(feature = "testing")]
pub use warren_testing;
