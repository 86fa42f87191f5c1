//! Dispatches exchanges through the intercept points.
//!
//! Points run in a fixed total order: before-auth, auth, after-auth,
//! before-forward, response. Within a point the chain is the named
//! records the request asked for (in request order) followed by the
//! globals (in registration order). The outcome of every stage is an
//! explicit [`Flow`] value; once a response is marked errored the
//! remaining entries of the current point still run, but the exchange
//! never reaches the forwarding stage. Response-point interceptors run
//! for errored exchanges too, on the error response.

use std::sync::Arc;

use tracing::{debug, error};

use crate::auth::{AclAuthorizer, Authenticator};
use crate::error::NotFoundError;
use crate::exchange::{Request, Response};
use crate::plugin::{InterceptPoint, InterceptorRecord, PluginRegistry};
use crate::state::Metrics;

/// Outcome of a pipeline stage, threaded explicitly between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

pub struct Pipeline {
    registry: Arc<PluginRegistry>,
    authenticator: Arc<dyn Authenticator>,
    acl: Arc<AclAuthorizer>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<PluginRegistry>,
        authenticator: Arc<dyn Authenticator>,
        acl: Arc<AclAuthorizer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            authenticator,
            acl,
            metrics,
        }
    }

    /// Runs one exchange through every stage. The response is complete
    /// when this returns.
    pub async fn run(&self, request: &mut Request, response: &mut Response) {
        self.route(request);

        if self.dispatch(InterceptPoint::RequestBeforeAuth, request, response) == Flow::Halt {
            self.dispatch(InterceptPoint::Response, request, response);
            return;
        }

        match self.authenticator.authenticate(request) {
            Some(principal) => {
                let permissions = self.acl.permissions_for(&principal);
                debug!(
                    "exchange {} authenticated as '{}'",
                    request.id(),
                    principal.id
                );
                request.set_authenticated(principal, permissions);
            }
            None => {
                response.set_error(401, "authentication required");
                self.dispatch(InterceptPoint::Response, request, response);
                return;
            }
        }

        for point in [
            InterceptPoint::Auth,
            InterceptPoint::RequestAfterAuth,
            InterceptPoint::RequestBeforeForward,
        ] {
            if self.dispatch(point, request, response) == Flow::Halt {
                self.dispatch(InterceptPoint::Response, request, response);
                return;
            }
        }

        self.forward(request, response).await;

        self.dispatch(InterceptPoint::Response, request, response);
    }

    /// Assigns the request to the first accepting service, in
    /// registration order.
    fn route(&self, request: &mut Request) {
        for record in self.registry.services() {
            if record.instance().accepts(request) {
                debug!("exchange {} routed to service '{}'", request.id(), record.name());
                request.set_handled_by(record.name());
                return;
            }
        }
    }

    /// Runs every matching interceptor at one point. Entries at the point
    /// all complete even after one errors the response; the returned flow
    /// tells the caller whether later stages may proceed.
    pub fn dispatch(
        &self,
        point: InterceptPoint,
        request: &mut Request,
        response: &mut Response,
    ) -> Flow {
        let chain = match self.chain_at(point, request) {
            Ok(chain) => chain,
            Err(e) => {
                error!("{} while dispatching {:?}", e, point);
                response.set_error(500, &e.to_string());
                return Flow::Halt;
            }
        };

        for entry in &chain {
            let interceptor = entry.record.instance();
            if !interceptor.resolve(request, response) {
                continue;
            }

            debug!(
                "interceptor '{}' handling exchange {} at {:?}",
                entry.record.name(),
                request.id(),
                point
            );
            self.metrics.record_interceptor_execution();

            if let Err(e) = interceptor.handle(request, response) {
                self.metrics.record_interceptor_error();
                error!(
                    "interceptor '{}' failed at {:?}: {:#}",
                    entry.record.name(),
                    point,
                    e
                );
                response.set_error(
                    500,
                    &format!("interceptor '{}' failed", entry.record.name()),
                );
            }
        }

        if response.is_in_error() {
            Flow::Halt
        } else {
            Flow::Continue
        }
    }

    fn chain_at(
        &self,
        point: InterceptPoint,
        request: &Request,
    ) -> Result<Vec<InterceptorRecord>, NotFoundError> {
        let mut chain = Vec::new();

        for name in request.requested_transformers() {
            let record = self.registry.transformer(name)?;
            if record.point == point {
                chain.push(record.clone());
            }
        }
        if point == InterceptPoint::RequestBeforeForward {
            for name in request.requested_checkers() {
                chain.push(self.registry.checker(name)?.clone());
            }
        }
        if point == InterceptPoint::Response {
            for name in request.requested_hooks() {
                chain.push(self.registry.hook(name)?.clone());
            }
        }

        for record in self.registry.global_transformers() {
            if record.point == point {
                chain.push(record.clone());
            }
        }
        for record in self.registry.global_checkers() {
            if record.point == point {
                chain.push(record.clone());
            }
        }
        for record in self.registry.global_hooks() {
            if record.point == point {
                chain.push(record.clone());
            }
        }

        Ok(chain)
    }

    /// The forwarding stage. Only reached when every request-phase point
    /// left the flow on Continue.
    async fn forward(&self, request: &mut Request, response: &mut Response) {
        let Some(name) = request.handled_by().map(str::to_string) else {
            response.set_error(404, "no service accepts this request");
            return;
        };

        let Some(record) = self
            .registry
            .services()
            .iter()
            .find(|record| record.name() == name)
        else {
            response.set_error(404, &format!("service '{name}' is not registered"));
            return;
        };

        if let Err(e) = record.instance().handle(request, response).await {
            self.metrics.record_failed_request();
            error!(
                "service '{}' failed handling exchange {}: {:#}",
                name,
                request.id(),
                e
            );
            response.set_error(500, "internal error");
        }
    }
}
