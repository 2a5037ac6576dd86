pub mod builders;
pub mod fake_executor;

use std::sync::Once;
use std::time::Duration;

use openfars::events::{EventMessage, EventName, Subscription};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=openfars=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .try_init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Receive messages until one named `name` arrives; returns everything
/// received including that message.
pub async fn recv_until(subscription: &mut Subscription, name: EventName) -> Vec<EventMessage> {
    let mut seen = Vec::new();
    while let Some(message) = subscription.receiver.recv().await {
        let done = message.event == name;
        seen.push(message);
        if done {
            break;
        }
    }
    seen
}

/// Receive messages until the run completes or fails.
pub async fn recv_until_terminal(subscription: &mut Subscription) -> Vec<EventMessage> {
    let mut seen = Vec::new();
    while let Some(message) = subscription.receiver.recv().await {
        let done = message.event.is_terminal();
        seen.push(message);
        if done {
            break;
        }
    }
    seen
}
