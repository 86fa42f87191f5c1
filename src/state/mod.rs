use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::auth::{AclAuthorizer, Authenticator, IdentityHeaderAuthenticator};
use crate::config::Config;
use crate::error::Result;
use crate::exchange::BufferPool;
use crate::plugin::PluginRegistry;
use crate::store::DocumentStore;

pub mod metrics;

pub use metrics::{Metrics, RequestTimer};

/// Shared process state. The plugin registry is an immutable snapshot
/// swapped atomically on reload; request tasks load it without locking
/// and keep the snapshot they started with.
pub struct GatewayState {
    pub config: Arc<Config>,
    registry: ArcSwap<PluginRegistry>,
    pub metrics: Arc<Metrics>,
    pub store: Arc<dyn DocumentStore>,
    pub buffer_pool: Arc<BufferPool>,
    pub authenticator: Arc<dyn Authenticator>,
    pub acl: Arc<AclAuthorizer>,
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl GatewayState {
    pub fn new(
        config: Config,
        registry: PluginRegistry,
        store: Arc<dyn DocumentStore>,
    ) -> Result<(Arc<Self>, tokio::sync::broadcast::Receiver<()>)> {
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(16);

        let buffer_pool = BufferPool::new(
            config.buffers.segment_size_bytes,
            config.buffers.max_segments,
        );
        let authenticator = Arc::new(IdentityHeaderAuthenticator::from_config(&config));
        let acl = Arc::new(AclAuthorizer::from_config(&config)?);

        let state = Arc::new(Self {
            config: Arc::new(config),
            registry: ArcSwap::from_pointee(registry),
            metrics: Arc::new(Metrics::new()),
            store,
            buffer_pool,
            authenticator,
            acl,
            shutdown_tx,
        });

        Ok((state, shutdown_rx))
    }

    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry.load_full()
    }

    /// Publishes a freshly built registry. In-flight exchanges keep the
    /// snapshot they loaded; new exchanges see the new one.
    pub fn publish_registry(&self, registry: PluginRegistry) {
        self.registry.store(Arc::new(registry));
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating gateway shutdown");
        let _ = self.shutdown_tx.send(());
    }
}
