//! Call policies applied by the pooled channel

use service_api::ServiceChannelSpec;
use std::time::Duration;

/// Timeout policy for calls
#[derive(Clone, Debug, PartialEq)]
pub struct TimeoutPolicy {
    /// Total budget for a call, retries included
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl TimeoutPolicy {
    pub fn from_millis(timeout_ms: u32) -> Self {
        let timeout = Duration::from_millis(timeout_ms as u64);
        Self {
            request_timeout: timeout,
            connect_timeout: timeout,
        }
    }
}

/// Retry policy for failed calls
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Total number of attempts a call may make
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a connection failure on `attempt` (0-based) may be retried
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Connection-level options of a pooled channel
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelOptions {
    pub timeout: TimeoutPolicy,
    pub retry: RetryPolicy,
}

impl ChannelOptions {
    pub fn from_spec(spec: &ServiceChannelSpec) -> Self {
        Self {
            timeout: TimeoutPolicy::from_millis(spec.timeout_ms),
            retry: RetryPolicy {
                max_retries: spec.max_retry,
            },
        }
    }
}
