use std::time::Duration;

/// Tuning for channel connections.
///
/// The defaults mirror the gateway deployment contract: one-second backoff
/// unit, ten-attempt backoff ceiling, and the historical queue capacities
/// (5 signals, 200 messages, 200 receipts, 200 outbound frames).
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Timeout for each socket connect attempt.
    pub connect_timeout: Duration,
    /// Base backoff unit; the delay after `n` consecutive failures is
    /// `base_backoff << min(n, attempt_limit)`.
    pub base_backoff: Duration,
    /// Consecutive-failure count past which backoff growth freezes.
    pub attempt_limit: u32,
    /// Capacity of the consumer-facing control-signal queue.
    pub signal_buffer: usize,
    /// Capacity of the consumer-facing message queue.
    pub message_buffer: usize,
    /// Capacity of the consumer-facing receipt queue.
    pub receipt_buffer: usize,
    /// Capacity of the data channel's outbound frame ring.
    pub write_buffer: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_secs(1),
            attempt_limit: 10,
            signal_buffer: 5,
            message_buffer: 200,
            receipt_buffer: 200,
            write_buffer: 200,
        }
    }
}

impl ConnConfig {
    /// Backoff delay after `attempt` consecutive connect failures.
    ///
    /// Doubles per failure and freezes once `attempt` reaches
    /// [`attempt_limit`](Self::attempt_limit).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(self.attempt_limit);
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_freezes() {
        let config = ConnConfig::default();
        let delays: Vec<u64> = (0..13)
            .map(|attempt| config.backoff_delay(attempt).as_secs())
            .collect();
        assert_eq!(
            delays,
            vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 1024, 1024]
        );
    }

    #[test]
    fn backoff_scales_with_base_unit() {
        let config = ConnConfig {
            base_backoff: Duration::from_millis(10),
            ..ConnConfig::default()
        };
        assert_eq!(config.backoff_delay(3), Duration::from_millis(80));
    }
}
