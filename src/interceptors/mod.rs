//! Built-in interceptors enforcing the per-role permission model.
//!
//! The gate interceptors run after authentication and veto by marking the
//! response errored, which halts the exchange before the forwarding
//! stage. The whitelist flags default to true, so each gate only fires
//! when an operator explicitly disabled the flag for the role.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::acl::{resolve_override_expression, strip_hidden_props};
use crate::exchange::{Request, Response};
use crate::plugin::Interceptor;

const DOCUMENTS_SERVICE: &str = "documents";

/// Forbids bulk PATCH and bulk DELETE for roles whose whitelistBulkPatch
/// or whitelistBulkDelete flag is off.
pub struct BulkRequestWhitelist;

impl Interceptor for BulkRequestWhitelist {
    fn resolve(&self, request: &Request, _response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };

        (!permissions.whitelist_bulk_delete() && request.is_bulk_documents() && request.is_delete())
            || (!permissions.whitelist_bulk_patch()
                && request.is_bulk_documents()
                && request.is_patch())
    }

    fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        debug!("bulk request {} forbidden by role permissions", request.id());
        response.set_error(403, "forbidden");
        Ok(())
    }
}

/// Forbids structure-level writes for roles whose
/// whitelistManagementRequests flag is off.
pub struct ManagementRequestWhitelist;

impl Interceptor for ManagementRequestWhitelist {
    fn resolve(&self, request: &Request, _response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };

        !permissions.whitelist_management_requests() && request.is_management_request()
    }

    fn handle(&self, _request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        response.set_error(403, "forbidden");
        Ok(())
    }
}

/// Forbids the `wm` write-mode qualifier for roles whose
/// allowAllWriteModes flag is off.
pub struct WriteModeWhitelist;

impl Interceptor for WriteModeWhitelist {
    fn resolve(&self, request: &Request, _response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };

        !permissions.allow_all_write_modes() && request.write_mode().is_some()
    }

    fn handle(&self, _request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        response.set_error(403, "forbidden");
        Ok(())
    }
}

/// Decides whether a write may touch a protected property. External
/// collaborator seam; the default denies every such write.
pub trait ProtectedPropsPolicy: Send + Sync {
    fn allows(&self, request: &Request, prop: &str) -> bool;
}

pub struct DenyProtectedWrites;

impl ProtectedPropsPolicy for DenyProtectedWrites {
    fn allows(&self, _request: &Request, _prop: &str) -> bool {
        false
    }
}

/// Rejects writes whose body touches a protected property, unless the
/// policy allows the write.
pub struct ProtectedPropsGuard {
    policy: Arc<dyn ProtectedPropsPolicy>,
}

impl ProtectedPropsGuard {
    pub fn new(policy: Arc<dyn ProtectedPropsPolicy>) -> Self {
        Self { policy }
    }
}

impl Interceptor for ProtectedPropsGuard {
    fn resolve(&self, request: &Request, _response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) || !request.is_write_request() {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };
        if permissions.protected_props().is_empty() {
            return false;
        }

        let Ok(Value::Object(body)) = serde_json::from_slice(&request.read_content()) else {
            return false;
        };
        body.keys().any(|key| {
            permissions.protected_props().contains(key) && !self.policy.allows(request, key)
        })
    }

    fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        debug!("exchange {} writes a protected property", request.id());
        response.set_error(403, "request writes a protected property");
        Ok(())
    }
}

/// Substitutes overridden properties into write bodies before the
/// forwarding stage.
pub struct OverriddenPropsApplier;

impl Interceptor for OverriddenPropsApplier {
    fn resolve(&self, request: &Request, _response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) || !request.is_write_request() {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };
        !permissions.overridden_props().is_empty()
            && matches!(
                serde_json::from_slice(&request.read_content()),
                Ok(Value::Object(_))
            )
    }

    fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        let Some(permissions) = request.permissions().cloned() else {
            return Ok(());
        };
        let mut body: Value = serde_json::from_slice(&request.read_content())?;

        if let Value::Object(map) = &mut body {
            for (prop, expr) in permissions.overridden_props() {
                let value = resolve_override_expression(expr, request.principal());
                map.insert(prop.clone(), value);
            }
        }

        let rewritten = serde_json::to_vec(&body)?;
        if request.write_content(Some(&rewritten)).is_err() {
            response.set_error(413, "rewritten body exceeds the buffer budget");
        }
        Ok(())
    }
}

/// Strips hidden properties from documents before they reach the client.
pub struct HiddenPropsFilter;

impl Interceptor for HiddenPropsFilter {
    fn resolve(&self, request: &Request, response: &Response) -> bool {
        if !request.is_handled_by(DOCUMENTS_SERVICE) || response.is_in_error() {
            return false;
        }
        let Some(permissions) = request.permissions() else {
            return false;
        };
        !permissions.hidden_props().is_empty() && !response.content().is_absent()
    }

    fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        let Some(permissions) = request.permissions().cloned() else {
            return Ok(());
        };
        let Ok(mut body) = serde_json::from_slice::<Value>(&response.read_content()) else {
            return Ok(());
        };

        strip_hidden_props(&mut body, permissions.hidden_props());

        let rewritten = serde_json::to_vec(&body)?;
        if response.write_content(Some(&rewritten)).is_err() {
            response.set_error(500, "filtered body exceeds the buffer budget");
        }
        Ok(())
    }
}
