use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Bounded retry applied to every catalog write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying only while it fails with a busy/locked store.
    /// Other errors are returned immediately. Exhaustion yields `Error::StoreBusy`.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_busy() => {
                    if attempt >= attempts {
                        return Err(Error::StoreBusy {
                            attempts,
                            message: err.to_string(),
                        });
                    }
                    warn!(attempt, attempts, "catalog busy, retrying: {err}");
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
