//! Error types for the data-access core
//!
//! - [`DecodeError`](crate::json::DecodeError): payload did not match the expected shape
//! - [`ClientError`]: anything that can fail a backend-facing operation
//! - [`QueueError`]: how a queued fetch failed, shared by every caller waiting on it
//! - [`ConfigError`]: rejected configuration

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::json::DecodeError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for backend-facing operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid api path {path:?}: {reason}")]
    InvalidPath { path: Vec<String>, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Expected a unique object, but query returned {count} results")]
    NotUnique { count: usize },

    #[error("Property '{property}' must have an associated '{property}Count' number")]
    MissingCount { property: String },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.http_status() == Some(404)
    }
}

/// Failure delivered to every caller waiting on a queued fetch.
///
/// Cloned once per waiter, so the underlying cause is shared.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Batch fetch of {} id(s) failed: {source}", .ids.len())]
    BatchFailed {
        ids: Vec<String>,
        source: Arc<ClientError>,
    },

    #[error("Batch fetch of {} id(s) timed out after {after:?}", .ids.len())]
    Timeout { ids: Vec<String>, after: Duration },

    #[error("Force close pending value {id}: resolve queue shut down")]
    Closed { id: String },
}

impl QueueError {
    /// Ids of the batch this failure belongs to
    pub fn batch_ids(&self) -> Vec<String> {
        match self {
            Self::BatchFailed { ids, .. } | Self::Timeout { ids, .. } => ids.clone(),
            Self::Closed { id } => vec![id.clone()],
        }
    }
}

/// Configuration rejected at construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    EmptyBatch,

    #[error("batch_size {batch_size} exceeds the server page size {page_size}")]
    BatchExceedsPageSize { batch_size: usize, page_size: usize },

    #[error("sample_period must be greater than zero")]
    ZeroSamplePeriod,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid api base href {href:?}: {reason}")]
    InvalidBaseHref { href: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = ClientError::Http {
            status: 404,
            url: "http://localhost/api/x/".into(),
            body: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!ClientError::NotUnique { count: 0 }.is_not_found());
    }

    #[test]
    fn test_queue_error_batch_ids() {
        let err = QueueError::BatchFailed {
            ids: vec!["a".into(), "b".into()],
            source: Arc::new(ClientError::InvalidResponse("boom".into())),
        };
        assert_eq!(err.batch_ids(), vec!["a", "b"]);
        assert_eq!(
            err.to_string(),
            "Batch fetch of 2 id(s) failed: Invalid response: boom"
        );
    }

    #[test]
    fn test_decode_error_converts() {
        let err: ClientError = DecodeError::new("/results/[0]/id", "Expected a string").into();
        assert_eq!(
            err.to_string(),
            "Decode error: Expected a string at '/results/[0]/id'"
        );
    }
}
