//! Test doubles for the I/O and application seams, shared by the unit tests of several modules

pub mod event_listener;
pub mod send_socket;

use std::time::Duration;

/// Polls a condition until it holds, for checking the effects of spawned tasks
pub async fn eventually(description: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for {}", description);
}
