//! Builds and publishes the immutable plugin registry.
//!
//! Construction runs once, single-threaded, at startup or reload. A
//! candidate whose factory fails is logged and skipped without affecting
//! the others; duplicate names within a kind and malformed plugin
//! configuration fail the whole build with an aggregated error. The
//! published registry exposes no mutation API; a reload builds a brand
//! new one.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{NotFoundError, RegistrationError, RegistryBuildError};

use super::catalog::{CandidateKind, PluginCandidate};
use super::descriptor::{
    effective_enabled, InterceptPoint, InterceptorScope, PluginRecord,
};
use super::{Initializer, Interceptor, Service};

/// An interceptor record plus the point it dispatches at.
pub struct InterceptorRecord {
    pub record: PluginRecord<dyn Interceptor>,
    pub point: InterceptPoint,
}

impl std::fmt::Debug for InterceptorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRecord")
            .field("record", &self.record)
            .field("point", &self.point)
            .finish()
    }
}

impl Clone for InterceptorRecord {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            point: self.point,
        }
    }
}

#[derive(Debug)]
pub struct PluginRegistry {
    initializers: Vec<PluginRecord<dyn Initializer>>,
    services: Vec<PluginRecord<dyn Service>>,
    transformers: HashMap<String, InterceptorRecord>,
    global_transformers: Vec<InterceptorRecord>,
    hooks: HashMap<String, InterceptorRecord>,
    global_hooks: Vec<InterceptorRecord>,
    checkers: HashMap<String, InterceptorRecord>,
    global_checkers: Vec<InterceptorRecord>,
}

impl PluginRegistry {
    fn empty() -> Self {
        Self {
            initializers: Vec::new(),
            services: Vec::new(),
            transformers: HashMap::new(),
            global_transformers: Vec::new(),
            hooks: HashMap::new(),
            global_hooks: Vec::new(),
            checkers: HashMap::new(),
            global_checkers: Vec::new(),
        }
    }

    pub fn build(
        candidates: Vec<PluginCandidate>,
        config: &Config,
    ) -> Result<Self, RegistryBuildError> {
        let mut registry = Self::empty();
        let mut fatal: Vec<RegistrationError> = Vec::new();
        // every candidate name is reserved per kind, enabled or not, so a
        // colliding later candidate can never silently take over
        let mut seen: HashMap<&'static str, HashSet<String>> = HashMap::new();

        for candidate in candidates {
            let kind = candidate.kind.kind_name();
            let name = candidate.descriptor.name.clone();
            let conf = config.plugin_args(&name);

            if !seen.entry(kind).or_default().insert(name.clone()) {
                fatal.push(RegistrationError::DuplicateName { kind, name });
                continue;
            }

            let enabled = match effective_enabled(candidate.descriptor.enabled_by_default, &conf) {
                Ok(enabled) => enabled,
                Err(source) => {
                    fatal.push(RegistrationError::Config { name, source });
                    continue;
                }
            };
            if !enabled {
                debug!("{} {} is disabled", kind, name);
                continue;
            }

            let descriptor = candidate.descriptor;
            match candidate.kind {
                CandidateKind::Initializer(factory) => match factory(&conf) {
                    Ok(instance) => {
                        info!(
                            "Registered initializer {}: {}",
                            descriptor.name, descriptor.description
                        );
                        registry
                            .initializers
                            .push(PluginRecord::new(descriptor, instance, conf, true));
                    }
                    Err(e) => error!(
                        "{}",
                        RegistrationError::Instantiation {
                            name,
                            reason: format!("{:#}", e),
                        }
                    ),
                },
                CandidateKind::Service(factory) => match factory(&conf) {
                    Ok(instance) => {
                        info!(
                            "Registered service {}: {}",
                            descriptor.name, descriptor.description
                        );
                        registry
                            .services
                            .push(PluginRecord::new(descriptor, instance, conf, true));
                    }
                    Err(e) => error!(
                        "{}",
                        RegistrationError::Instantiation {
                            name,
                            reason: format!("{:#}", e),
                        }
                    ),
                },
                CandidateKind::Transformer {
                    point,
                    scope,
                    factory,
                } => match factory(&conf) {
                    Ok(instance) => {
                        info!(
                            "Registered transformer {}: {}",
                            descriptor.name, descriptor.description
                        );
                        let record = InterceptorRecord {
                            record: PluginRecord::new(descriptor, instance, conf, true),
                            point,
                        };
                        match scope {
                            InterceptorScope::Named => {
                                registry.transformers.insert(name, record);
                            }
                            InterceptorScope::Global => registry.global_transformers.push(record),
                        }
                    }
                    Err(e) => error!(
                        "{}",
                        RegistrationError::Instantiation {
                            name,
                            reason: format!("{:#}", e),
                        }
                    ),
                },
                CandidateKind::Hook { scope, factory } => match factory(&conf) {
                    Ok(instance) => {
                        info!(
                            "Registered hook {}: {}",
                            descriptor.name, descriptor.description
                        );
                        let record = InterceptorRecord {
                            record: PluginRecord::new(descriptor, instance, conf, true),
                            point: InterceptPoint::Response,
                        };
                        match scope {
                            InterceptorScope::Named => {
                                registry.hooks.insert(name, record);
                            }
                            InterceptorScope::Global => registry.global_hooks.push(record),
                        }
                    }
                    Err(e) => error!(
                        "{}",
                        RegistrationError::Instantiation {
                            name,
                            reason: format!("{:#}", e),
                        }
                    ),
                },
                CandidateKind::Checker { scope, factory } => match factory(&conf) {
                    Ok(instance) => {
                        info!(
                            "Registered checker {}: {}",
                            descriptor.name, descriptor.description
                        );
                        let record = InterceptorRecord {
                            record: PluginRecord::new(descriptor, instance, conf, true),
                            point: InterceptPoint::RequestBeforeForward,
                        };
                        match scope {
                            InterceptorScope::Named => {
                                registry.checkers.insert(name, record);
                            }
                            InterceptorScope::Global => registry.global_checkers.push(record),
                        }
                    }
                    Err(e) => error!(
                        "{}",
                        RegistrationError::Instantiation {
                            name,
                            reason: format!("{:#}", e),
                        }
                    ),
                },
            }
        }

        // lowest priority first; the sort is stable so ties keep their
        // discovery order
        registry
            .initializers
            .sort_by_key(|record| record.descriptor().priority);

        if fatal.is_empty() {
            Ok(registry)
        } else {
            Err(RegistryBuildError { errors: fatal })
        }
    }

    /// Initializers sorted by ascending priority.
    pub fn initializers(&self) -> &[PluginRecord<dyn Initializer>] {
        &self.initializers
    }

    /// Services in registration order.
    pub fn services(&self) -> &[PluginRecord<dyn Service>] {
        &self.services
    }

    pub fn transformer(&self, name: &str) -> Result<&InterceptorRecord, NotFoundError> {
        self.transformers.get(name).ok_or_else(|| NotFoundError {
            kind: "transformer",
            name: name.to_string(),
        })
    }

    pub fn hook(&self, name: &str) -> Result<&InterceptorRecord, NotFoundError> {
        self.hooks.get(name).ok_or_else(|| NotFoundError {
            kind: "hook",
            name: name.to_string(),
        })
    }

    pub fn checker(&self, name: &str) -> Result<&InterceptorRecord, NotFoundError> {
        self.checkers.get(name).ok_or_else(|| NotFoundError {
            kind: "checker",
            name: name.to_string(),
        })
    }

    pub fn global_transformers(&self) -> &[InterceptorRecord] {
        &self.global_transformers
    }

    pub fn global_hooks(&self) -> &[InterceptorRecord] {
        &self.global_hooks
    }

    pub fn global_checkers(&self) -> &[InterceptorRecord] {
        &self.global_checkers
    }
}
