use std::time::Duration;

/// A doubling back-off sequence with a hard upper bound.
///
/// Each call to [`Backoff::delay`] returns the next wait duration,
/// starting at `initial` and doubling until `limit` is reached.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    next: Duration,
    limit: Duration,
}

impl Backoff {
    pub const fn new(initial: Duration, limit: Duration) -> Self {
        Self {
            initial,
            next: initial,
            limit,
        }
    }

    /// The next duration to wait for.
    pub fn delay(&mut self) -> Duration {
        let delay = if self.next > self.limit {
            self.limit
        } else {
            self.next
        };

        self.next = self.next.saturating_mul(2);

        delay
    }

    pub async fn wait(&mut self) {
        let delay = self.delay();
        tokio::time::sleep(delay).await
    }

    pub fn reset(&mut self) {
        self.next = self.initial
    }
}
