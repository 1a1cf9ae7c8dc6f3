//! Client-side data access for the assessment api.
//!
//! Layers, bottom up:
//!
//! - [`json`]: composable decoders with precise error paths
//! - [`model`]: model identity and references
//! - [`backend`]: the wire transport, with an http implementation
//! - [`pagination`]: page and cursor protocols over a backend
//! - [`service`]: generic per-model api operations
//! - [`queue`]: batched fetching by id
//! - [`domain`]: concrete school models and services

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod json;
pub mod model;
pub mod pagination;
pub mod queue;
pub mod service;
pub mod telemetry;

pub use backend::{Backend, HttpBackend, Params, RequestOptions};
pub use config::ClientConfig;
pub use error::{ClientError, ConfigError, QueueError, Result};
pub use json::{DecodeError, Decoder};
pub use model::{Model, ModelMap, Ref};
pub use pagination::{ResponseCursor, ResponsePage};
pub use queue::{
    FetchQueue, LoadOptions, ModelLoader, PendingFetch, QueueConfig, ResolveEvent, ResolveQueue,
    Resolver,
};
pub use service::ModelApiService;
