//! The pluggable-unit system.
//!
//! Plugins enter the gateway through an explicit registration table built
//! at startup, not through runtime scanning: each built-in (or embedded
//! extension) contributes a descriptor plus a factory, and the registry
//! validates, instantiates, and publishes them as an immutable snapshot.
//!
//! # Capability kinds
//!
//! - `Initializer`: runs once at startup, ordered by priority
//! - `Service`: claims and handles exchanges (the forwarding stage)
//! - `Interceptor`: runs at an intercept point, named or global; the
//!   registry tracks transformers, hooks, and checkers as separate kinds
//!
//! # Modules
//!
//! - `descriptor`: plugin metadata and the record binding
//! - `catalog`: the (descriptor, factory) registration table
//! - `registry`: build, validation, ordering, and lookups

pub mod catalog;
pub mod descriptor;
pub mod registry;

pub use catalog::{CandidateKind, PluginCandidate};
pub use descriptor::{InterceptPoint, InterceptorScope, PluginDescriptor, PluginRecord};
pub use registry::{InterceptorRecord, PluginRegistry};

use async_trait::async_trait;

use crate::exchange::{Request, Response};

/// Runs once at process startup, before the listener accepts exchanges.
/// Lower priority runs first.
#[async_trait]
pub trait Initializer: Send + Sync {
    async fn init(&self) -> anyhow::Result<()>;
}

/// Claims and handles exchanges. The router assigns each request to the
/// first accepting service in registration order.
#[async_trait]
pub trait Service: Send + Sync {
    fn accepts(&self, request: &Request) -> bool;

    async fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()>;
}

/// A pluggable unit dispatched at an intercept point. `handle` runs only
/// when `resolve` returns true for the exchange; it may rewrite the
/// request or the response, including marking the response errored to
/// veto further processing.
pub trait Interceptor: Send + Sync {
    fn resolve(&self, request: &Request, response: &Response) -> bool;

    fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()>;
}
