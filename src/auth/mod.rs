//! Authentication and role resolution.
//!
//! Authentication proper is a collaborator behind the [`Authenticator`]
//! trait; the gateway only needs a principal and the permission model for
//! one of its roles. The built-in implementation trusts an identity
//! header set by an upstream reverse proxy, which is the narrowest seam
//! that exercises the rest of the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use crate::acl::MongoPermissions;
use crate::config::Config;
use crate::error::ConfigError;
use crate::exchange::Request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &Request) -> Option<Principal>;
}

/// Trusts a configured identity header and resolves roles from the
/// `identity.users` table. Users absent from the table authenticate with
/// no roles.
pub struct IdentityHeaderAuthenticator {
    header: String,
    roles_by_user: HashMap<String, Vec<String>>,
}

impl IdentityHeaderAuthenticator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            header: config.identity.header.clone(),
            roles_by_user: config.identity.users.clone(),
        }
    }
}

impl Authenticator for IdentityHeaderAuthenticator {
    fn authenticate(&self, request: &Request) -> Option<Principal> {
        let id = request.header(&self.header)?;
        let roles = self.roles_by_user.get(id).cloned().unwrap_or_default();
        Some(Principal {
            id: id.to_string(),
            roles,
        })
    }
}

/// Role-to-permissions table, parsed once at startup. A malformed ACL
/// entry aborts startup rather than serving with a guessed default.
#[derive(Debug)]
pub struct AclAuthorizer {
    by_role: HashMap<String, Arc<MongoPermissions>>,
    unconfigured: Arc<MongoPermissions>,
}

impl AclAuthorizer {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut by_role = HashMap::new();
        for (role, raw) in &config.acl {
            let permissions = MongoPermissions::from_value(raw).map_err(|e| {
                ConfigError::Validation(format!("acl role '{role}': {e}"))
            })?;
            by_role.insert(role.clone(), Arc::new(permissions));
        }

        Ok(Self {
            by_role,
            // roles with no acl entry get the absence defaults
            unconfigured: Arc::new(MongoPermissions::default()),
        })
    }

    /// Permissions for the first of the principal's roles that has an ACL
    /// entry.
    pub fn permissions_for(&self, principal: &Principal) -> Arc<MongoPermissions> {
        principal
            .roles
            .iter()
            .find_map(|role| self.by_role.get(role))
            .cloned()
            .unwrap_or_else(|| self.unconfigured.clone())
    }
}
