//! Exponential backoff for lost connections
//!
//! Two failure paths stay separate. A connection-level failure status
//! (connect failed or closed) goes through [`ReconnectPolicy::on_failure`]
//! and consumes a retry. A transport I/O error reconnects at once without
//! touching the retry count.

use std::time::Duration;

use crate::client::config::ClientConfig;

/// What to do after a connection-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Sleep for `delay`, then connect again
    Retry { delay: Duration },
    /// Out of retries
    GiveUp { attempts: u32 },
}

/// Reconnect driver
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_retry_count: u32,
    base_delay: Duration,
    retry_count: u32,
}

impl ReconnectPolicy {
    pub fn new(max_retry_count: u32, base_delay: Duration) -> Self {
        Self {
            max_retry_count,
            base_delay,
            retry_count: 0,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_retry_count, config.retry_base_delay)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Delay before attempt number `retry_count`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let multiplier = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Connect failed or the server closed the connection
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if self.retry_count > self.max_retry_count {
            return ReconnectDecision::GiveUp {
                attempts: self.retry_count,
            };
        }
        let delay = self.delay_for(self.retry_count);
        self.retry_count += 1;
        ReconnectDecision::Retry { delay }
    }

    /// Connected: the next failure starts from the shortest delay
    pub fn on_connect_success(&mut self) {
        self.retry_count = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let mut policy = ReconnectPolicy::default();
        let expected = [1, 2, 4, 8, 16, 32];
        for secs in expected {
            assert_eq!(
                policy.on_failure(),
                ReconnectDecision::Retry {
                    delay: Duration::from_secs(secs)
                }
            );
        }
        assert_eq!(policy.retry_count(), 6);
    }

    #[test]
    fn test_gives_up_once_past_max() {
        let mut policy = ReconnectPolicy::new(5, Duration::from_millis(1));
        let retries = std::iter::from_fn(|| match policy.on_failure() {
            ReconnectDecision::Retry { .. } => Some(()),
            ReconnectDecision::GiveUp { .. } => None,
        })
        .count();
        // retry_count 0..=5 still retries
        assert_eq!(retries, 6);
        assert_eq!(policy.on_failure(), ReconnectDecision::GiveUp { attempts: 6 });
    }

    #[test]
    fn test_success_resets() {
        let mut policy = ReconnectPolicy::default();
        policy.on_failure();
        policy.on_failure();
        policy.on_connect_success();
        assert_eq!(policy.retry_count(), 0);
        assert_eq!(
            policy.on_failure(),
            ReconnectDecision::Retry {
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_delay_saturates() {
        let policy = ReconnectPolicy::new(100, Duration::from_secs(1));
        assert_eq!(policy.delay_for(40), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[test]
    fn test_zero_retries() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert!(matches!(policy.on_failure(), ReconnectDecision::Retry { .. }));
        assert_eq!(policy.on_failure(), ReconnectDecision::GiveUp { attempts: 1 });
    }
}
