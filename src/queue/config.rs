//! Resolve queue configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for batching in a [`ResolveQueue`](super::ResolveQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum ids claimed per batch.
    ///
    /// A batch is fetched as a single page, so this may not exceed
    /// `server_page_size`.
    pub batch_size: usize,

    /// Window during which newly queued ids are collected before a batch is
    /// claimed. The window starts when work arrives.
    pub sample_period: Duration,

    /// Page size the server uses for list endpoints.
    pub server_page_size: usize,

    /// Fail a batch whose resolver call has not completed in time.
    /// `None` waits indefinitely.
    pub batch_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            sample_period: Duration::from_millis(100),
            server_page_size: 20,
            batch_timeout: None,
        }
    }
}

impl QueueConfig {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn server_page_size(mut self, size: usize) -> Self {
        self.server_page_size = size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if self.batch_size > self.server_page_size {
            return Err(ConfigError::BatchExceedsPageSize {
                batch_size: self.batch_size,
                page_size: self.server_page_size,
            });
        }
        if self.sample_period.is_zero() {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        Ok(())
    }
}
