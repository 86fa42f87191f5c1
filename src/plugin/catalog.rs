//! The startup-time registration table.
//!
//! A candidate is everything the registry needs to validate and
//! instantiate one plugin: its descriptor and a factory taking the
//! resolved configuration sub-map. The table replaces any runtime
//! discovery mechanism; embedding a plugin means appending to it.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::descriptor::{InterceptPoint, InterceptorScope, PluginDescriptor};
use super::{Initializer, Interceptor, Service};
use crate::interceptors;
use crate::services::{DocumentsService, PingService, StoreHealthInitializer};
use crate::store::DocumentStore;

pub type ConfigMap = Map<String, Value>;

pub type InitializerFactory =
    Box<dyn Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Initializer>> + Send + Sync>;
pub type ServiceFactory =
    Box<dyn Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;
pub type InterceptorFactory =
    Box<dyn Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Interceptor>> + Send + Sync>;

pub struct PluginCandidate {
    pub descriptor: PluginDescriptor,
    pub kind: CandidateKind,
}

/// Hooks always run at the response point and checkers always before the
/// forwarding stage; transformers declare their point.
pub enum CandidateKind {
    Initializer(InitializerFactory),
    Service(ServiceFactory),
    Transformer {
        point: InterceptPoint,
        scope: InterceptorScope,
        factory: InterceptorFactory,
    },
    Hook {
        scope: InterceptorScope,
        factory: InterceptorFactory,
    },
    Checker {
        scope: InterceptorScope,
        factory: InterceptorFactory,
    },
}

impl CandidateKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Initializer(_) => "initializer",
            Self::Service(_) => "service",
            Self::Transformer { .. } => "transformer",
            Self::Hook { .. } => "hook",
            Self::Checker { .. } => "checker",
        }
    }
}

impl PluginCandidate {
    pub fn initializer<F>(descriptor: PluginDescriptor, factory: F) -> Self
    where
        F: Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Initializer>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: CandidateKind::Initializer(Box::new(factory)),
        }
    }

    pub fn service<F>(descriptor: PluginDescriptor, factory: F) -> Self
    where
        F: Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: CandidateKind::Service(Box::new(factory)),
        }
    }

    pub fn transformer<F>(
        descriptor: PluginDescriptor,
        point: InterceptPoint,
        scope: InterceptorScope,
        factory: F,
    ) -> Self
    where
        F: Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Interceptor>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: CandidateKind::Transformer {
                point,
                scope,
                factory: Box::new(factory),
            },
        }
    }

    pub fn hook<F>(descriptor: PluginDescriptor, scope: InterceptorScope, factory: F) -> Self
    where
        F: Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Interceptor>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: CandidateKind::Hook {
                scope,
                factory: Box::new(factory),
            },
        }
    }

    pub fn checker<F>(descriptor: PluginDescriptor, scope: InterceptorScope, factory: F) -> Self
    where
        F: Fn(&ConfigMap) -> anyhow::Result<Arc<dyn Interceptor>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            kind: CandidateKind::Checker {
                scope,
                factory: Box::new(factory),
            },
        }
    }
}

/// The built-in plugin set: the document and ping services, the ACL gate
/// interceptors, the property-visibility interceptors, and the store
/// health initializer.
pub fn builtin(store: Arc<dyn DocumentStore>) -> Vec<PluginCandidate> {
    let documents_store = store.clone();
    let health_store = store;

    vec![
        PluginCandidate::initializer(
            PluginDescriptor::new(
                "storeHealth",
                "Pings the backing store before the listener starts",
                true,
                "docgate::services::StoreHealthInitializer",
            )
            .with_priority(10),
            move |_conf| Ok(Arc::new(StoreHealthInitializer::new(health_store.clone())) as _),
        ),
        PluginCandidate::service(
            PluginDescriptor::new(
                "ping",
                "Liveness probe endpoint",
                true,
                "docgate::services::PingService",
            ),
            |_conf| Ok(Arc::new(PingService) as _),
        ),
        PluginCandidate::service(
            PluginDescriptor::new(
                "documents",
                "Forwards document operations to the backing store",
                true,
                "docgate::services::DocumentsService",
            ),
            move |_conf| Ok(Arc::new(DocumentsService::new(documents_store.clone())) as _),
        ),
        PluginCandidate::transformer(
            PluginDescriptor::new(
                "whitelistBulkRequests",
                "Forbids bulk PATCH and bulk DELETE when the role's whitelistBulkPatch / whitelistBulkDelete flags are off",
                true,
                "docgate::interceptors::BulkRequestWhitelist",
            ),
            InterceptPoint::RequestAfterAuth,
            InterceptorScope::Global,
            |_conf| Ok(Arc::new(interceptors::BulkRequestWhitelist) as _),
        ),
        PluginCandidate::transformer(
            PluginDescriptor::new(
                "whitelistManagementRequests",
                "Forbids structure-level writes when the role's whitelistManagementRequests flag is off",
                true,
                "docgate::interceptors::ManagementRequestWhitelist",
            ),
            InterceptPoint::RequestAfterAuth,
            InterceptorScope::Global,
            |_conf| Ok(Arc::new(interceptors::ManagementRequestWhitelist) as _),
        ),
        PluginCandidate::transformer(
            PluginDescriptor::new(
                "whitelistWriteModes",
                "Forbids write mode qualifiers when the role's allowAllWriteModes flag is off",
                true,
                "docgate::interceptors::WriteModeWhitelist",
            ),
            InterceptPoint::RequestAfterAuth,
            InterceptorScope::Global,
            |_conf| Ok(Arc::new(interceptors::WriteModeWhitelist) as _),
        ),
        PluginCandidate::checker(
            PluginDescriptor::new(
                "protectedPropsGuard",
                "Rejects writes touching protected properties unless the write policy allows them",
                true,
                "docgate::interceptors::ProtectedPropsGuard",
            ),
            InterceptorScope::Global,
            |_conf| {
                Ok(Arc::new(interceptors::ProtectedPropsGuard::new(Arc::new(
                    interceptors::DenyProtectedWrites,
                ))) as _)
            },
        ),
        PluginCandidate::checker(
            PluginDescriptor::new(
                "overriddenPropsApplier",
                "Substitutes overridden properties into write bodies",
                true,
                "docgate::interceptors::OverriddenPropsApplier",
            ),
            InterceptorScope::Global,
            |_conf| Ok(Arc::new(interceptors::OverriddenPropsApplier) as _),
        ),
        PluginCandidate::hook(
            PluginDescriptor::new(
                "hiddenPropsFilter",
                "Strips hidden properties from documents returned to the client",
                true,
                "docgate::interceptors::HiddenPropsFilter",
            ),
            InterceptorScope::Global,
            |_conf| Ok(Arc::new(interceptors::HiddenPropsFilter) as _),
        ),
    ]
}
