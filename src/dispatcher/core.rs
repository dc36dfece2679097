use super::handler::{HandlerRequest, HandlerResponse};
use crate::assembler::{assemble, parse_query_string, RawRequest};
use crate::error::DispatchError;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::registry::{RegisteredRoute, Registry};
use crate::rpc::{parse_envelope, RpcResponseEnvelope};
use crate::runtime_config::RuntimeConfig;
use crate::security::{AuthContext, PermissionCheck};
use crate::spec::RouteMethod;
use crate::validator_cache::ValidatorKind;
use http::{HeaderValue, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Per-request state machine. Terminal states are `Responded` and
/// `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    Authenticating,
    PermissionChecking,
    Assembling,
    Validating,
    Invoking,
    Responded,
    Rejected,
}

/// Transport-neutral HTTP outcome, ready for an adapter to write.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub request_id: RequestId,
    pub status: StatusCode,
    pub body: Option<Value>,
    /// `Location` of a redirect.
    pub location: Option<String>,
}

impl HttpReply {
    fn json(request_id: RequestId, status: StatusCode, body: Value) -> Self {
        Self {
            request_id,
            status,
            body: Some(body),
            location: None,
        }
    }

    fn from_error(request_id: RequestId, err: &DispatchError) -> Self {
        Self::json(request_id, err.status(), err.to_http_body())
    }

    fn from_handler(request_id: RequestId, resp: HandlerResponse) -> Self {
        match resp {
            HandlerResponse::Ok(body) => Self::json(request_id, StatusCode::OK, body),
            HandlerResponse::Error { code, payload } => {
                let status =
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Self::json(request_id, status, payload)
            }
            HandlerResponse::Redirect { url, status } => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(StatusCode::is_redirection)
                    .unwrap_or(StatusCode::FOUND);
                Self {
                    request_id,
                    status,
                    body: None,
                    location: Some(url),
                }
            }
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.location.is_some()
    }

    /// Convert into an `http::Response`, setting `Location` and
    /// `x-request-id`.
    pub fn into_response(self) -> http::Response<Value> {
        let mut resp = http::Response::new(self.body.unwrap_or(Value::Null));
        *resp.status_mut() = self.status;
        if let Ok(v) = HeaderValue::from_str(&self.request_id.to_string()) {
            resp.headers_mut().insert(REQUEST_ID_HEADER, v);
        }
        if let Some(v) = self
            .location
            .as_deref()
            .and_then(|l| HeaderValue::from_str(l).ok())
        {
            resp.headers_mut().insert(http::header::LOCATION, v);
        }
        resp
    }
}

/// Aborts the spawned handler task when the waiting future is dropped,
/// e.g. when the deadline expires.
struct AbortOnDrop(JoinHandle<HandlerResponse>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// The Dispatch Engine. Cheap to clone; all state is shared and read-only.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    permission_check: Option<Arc<dyn PermissionCheck>>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("permission_check", &self.permission_check.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            permission_check: None,
            config,
        }
    }

    /// Install the global permission check.
    #[must_use]
    pub fn with_permission_check(mut self, check: impl PermissionCheck + 'static) -> Self {
        self.permission_check = Some(Arc::new(check));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Dispatch an HTTP call to the route with `uuid`. The credential is the
    /// `authorization` header; the request id is reused from `x-request-id`
    /// when it parses.
    pub async fn dispatch_http(&self, uuid: &str, raw: RawRequest) -> HttpReply {
        let request_id = RequestId::from_header_or_new(raw.header(REQUEST_ID_HEADER));
        let Some(route) = self.registry.route(uuid) else {
            let err = DispatchError::RouteNotFound(uuid.to_string());
            warn!(request_id = %request_id, route_uuid = %uuid, "Route not found");
            return HttpReply::from_error(request_id, &err);
        };
        if route.descriptor.method == RouteMethod::Rpc {
            let err = DispatchError::RouteNotFound(uuid.to_string());
            warn!(request_id = %request_id, route_uuid = %uuid, "RPC route called over HTTP");
            return HttpReply::from_error(request_id, &err);
        }
        let credential = raw.header("authorization").map(str::to_string);
        match self
            .run(&route, request_id, credential.as_deref(), &raw)
            .await
        {
            Ok(resp) => HttpReply::from_handler(request_id, resp),
            Err(err) => HttpReply::from_error(request_id, &err),
        }
    }

    /// Match `method` and `path` against the registry, merge the captured
    /// path parameters into `raw.params` and dispatch.
    pub async fn dispatch_http_path(
        &self,
        method: &http::Method,
        path: &str,
        mut raw: RawRequest,
    ) -> HttpReply {
        let matched = RouteMethod::try_from(method)
            .ok()
            .and_then(|m| self.registry.http_route(m, path));
        let Some((route, params)) = matched else {
            let request_id = RequestId::from_header_or_new(raw.header(REQUEST_ID_HEADER));
            let err = DispatchError::RouteNotFound(format!("{method} {path}"));
            warn!(request_id = %request_id, method = %method, path = %path, "Route not found");
            return HttpReply::from_error(request_id, &err);
        };
        for (k, v) in params {
            raw.params.entry(k).or_insert(v);
        }
        if let Some((_, query)) = path.split_once('?') {
            if raw.query.is_empty() {
                raw.query = parse_query_string(query);
            }
        }
        self.dispatch_http(&route.descriptor.uuid, raw).await
    }

    /// Dispatch one RPC envelope. Never fails: every outcome is an envelope.
    pub async fn dispatch_rpc(&self, packet: &Value) -> RpcResponseEnvelope {
        let envelope = match parse_envelope(packet) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "Malformed RPC packet");
                return RpcResponseEnvelope::from_dispatch_error(&DispatchError::from(e));
            }
        };
        let request_id = RequestId::new();
        let Some(route) = self.registry.rpc_route(&envelope.endpoint) else {
            warn!(
                request_id = %request_id,
                endpoint = %envelope.endpoint,
                "RPC endpoint does not exist"
            );
            return RpcResponseEnvelope::from_dispatch_error(
                &DispatchError::RpcEndpointDoesNotExist(envelope.endpoint),
            );
        };

        let credential = Some(envelope.authorization.as_str()).filter(|c| !c.is_empty());
        let raw = RawRequest::new().with_body(envelope.params);
        match self.run(&route, request_id, credential, &raw).await {
            Ok(HandlerResponse::Ok(result)) => RpcResponseEnvelope::success(envelope.id, result),
            Ok(HandlerResponse::Error { code, payload }) => {
                let message = match payload {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                RpcResponseEnvelope::failure(envelope.id, code, message)
            }
            Ok(HandlerResponse::Redirect { url, .. }) => {
                error!(
                    request_id = %request_id,
                    route_uuid = %route.descriptor.uuid,
                    url = %url,
                    "Redirect returned from an RPC route"
                );
                RpcResponseEnvelope::from_dispatch_error(&DispatchError::Internal(
                    "redirect is not supported on RPC routes".into(),
                ))
            }
            Err(err) => RpcResponseEnvelope::from_dispatch_error(&err),
        }
    }

    /// Run the chain under the configured deadline.
    async fn run(
        &self,
        route: &RegisteredRoute,
        request_id: RequestId,
        credential: Option<&str>,
        raw: &RawRequest,
    ) -> Result<HandlerResponse, DispatchError> {
        let uuid = &route.descriptor.uuid;
        debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Received, "Dispatch stage");
        let start = Instant::now();
        let deadline = self.config.deadline;

        let outcome = match tokio::time::timeout(deadline, self.chain(route, request_id, credential, raw)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    request_id = %request_id,
                    route_uuid = %uuid,
                    deadline_ms = deadline.as_millis() as u64,
                    "Deadline exceeded"
                );
                Err(DispatchError::DeadlineExceeded(deadline))
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => {
                debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Responded, "Dispatch stage");
                info!(request_id = %request_id, route_uuid = %uuid, latency_ms, "Request handled");
            }
            Err(err) => {
                debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Rejected, "Dispatch stage");
                warn!(
                    request_id = %request_id,
                    route_uuid = %uuid,
                    code = %err.code(),
                    error = %err,
                    latency_ms,
                    "Request rejected"
                );
            }
        }
        outcome
    }

    async fn chain(
        &self,
        route: &RegisteredRoute,
        request_id: RequestId,
        credential: Option<&str>,
        raw: &RawRequest,
    ) -> Result<HandlerResponse, DispatchError> {
        let descriptor = &route.descriptor;
        let uuid = descriptor.uuid.as_str();

        debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Authenticating, "Dispatch stage");
        let auth_id = descriptor
            .auth_id
            .as_deref()
            .unwrap_or(&self.config.default_auth_id);
        let auth = self
            .registry
            .auth()
            .resolve(descriptor.auth_id.as_deref(), &self.config.default_auth_id)
            .ok_or_else(|| DispatchError::AuthHandlerNotFound(auth_id.to_string()))?;
        let meta: AuthContext = auth
            .authenticate(credential)
            .await
            .map_err(|e| DispatchError::AuthenticationFailed(e.to_string()))?;

        if let Some(check) = &self.permission_check {
            debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::PermissionChecking, "Dispatch stage");
            if !check.check(&meta, descriptor.permission_tag.as_deref()).await {
                return Err(DispatchError::PermissionCheckFailed);
            }
        }

        debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Assembling, "Dispatch stage");
        let candidate = assemble(raw, &descriptor.request.source_list, descriptor.method);

        debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Validating, "Dispatch stage");
        let validator = self
            .registry
            .validator(uuid, ValidatorKind::Request)
            .ok_or_else(|| DispatchError::Internal(format!("no request validator for '{uuid}'")))?;
        let request = validator
            .validate(candidate)
            .map_err(DispatchError::ValidationFailed)?;

        debug!(request_id = %request_id, route_uuid = %uuid, stage = ?DispatchStage::Invoking, "Dispatch stage");
        let handler_request = HandlerRequest {
            request_id,
            route_uuid: uuid.to_string(),
            method: descriptor.method,
            request,
            meta,
        };
        let handler = Arc::clone(&route.handler);
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.call(handler_request).await }));
        let response = match (&mut task.0).await {
            Ok(resp) => resp,
            Err(join_err) if join_err.is_panic() => {
                let panic_message = panic_message(join_err.into_panic().as_ref());
                error!(
                    request_id = %request_id,
                    route_uuid = %uuid,
                    handler_name = %descriptor.handler_ref,
                    panic_message = %panic_message,
                    "Handler panicked - CRITICAL"
                );
                return Err(DispatchError::Internal("handler panicked".into()));
            }
            Err(join_err) => {
                error!(request_id = %request_id, route_uuid = %uuid, error = %join_err, "Handler task cancelled");
                return Err(DispatchError::Internal("handler task cancelled".into()));
            }
        };

        if let HandlerResponse::Ok(body) = &response {
            if let Some(v) = self.registry.validator(uuid, ValidatorKind::Response) {
                if let Err(issues) = v.validate(body.clone()) {
                    warn!(
                        request_id = %request_id,
                        route_uuid = %uuid,
                        issues = ?issues,
                        "Handler response does not match the declared response shape"
                    );
                }
            }
        }
        Ok(response)
    }
}
