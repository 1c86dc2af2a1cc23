//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Poll `condition` until it holds, panicking after [`test_timeout`]
pub fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + test_timeout();
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}
