//! Batched fetching by id
//!
//! - [`ResolveQueue`]: generic batching of id lookups behind a [`Resolver`]
//! - [`FetchQueue`]: a resolve queue over a model api service
//! - [`ModelLoader`]: loads references and tracks loading state

mod config;
mod fetch;
mod loader;
mod resolve;

pub use config::QueueConfig;
pub use fetch::FetchQueue;
pub use loader::{LoadOptions, ModelLoader};
pub use resolve::{
    resolver_fn, FnResolver, PendingFetch, QueueOptions, QueueStats, ResolveEvent, ResolveQueue,
    Resolver, Settled,
};
