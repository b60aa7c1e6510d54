//! Shared test infrastructure for the queue crates.
//!
//! - `TestNats`: NATS container with JetStream, cleaned up on drop (feature: "nats")
//!
//! ```rust,no_run
//! use test_utils::TestNats;
//!
//! #[tokio::test]
//! async fn my_jetstream_test() {
//!     let nats = TestNats::new().await;
//!     let client = async_nats::connect(nats.connection_string()).await.unwrap();
//! }
//! ```

#[cfg(feature = "nats")]
mod nats;

#[cfg(feature = "nats")]
pub use nats::TestNats;
