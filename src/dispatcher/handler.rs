use crate::ids::RequestId;
use crate::security::AuthContext;
use crate::spec::RouteMethod;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

/// What a route handler receives once auth, permission and validation
/// have passed.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub route_uuid: String,
    pub method: RouteMethod,
    /// The validated request object, pruned to declared fields.
    pub request: Value,
    /// Metadata returned by the auth handler.
    pub meta: AuthContext,
}

impl HandlerRequest {
    /// Error response with an application code and payload. HTTP uses the
    /// code as the status; RPC uses it as `appCode` and keeps the call id.
    pub fn error(&self, code: u16, payload: impl Into<Value>) -> HandlerResponse {
        HandlerResponse::Error {
            code,
            payload: payload.into(),
        }
    }

    /// Redirect response. Only meaningful on HTTP routes.
    pub fn redirect(&self, url: impl Into<String>, status: u16) -> HandlerResponse {
        HandlerResponse::Redirect {
            url: url.into(),
            status,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.meta.user_id()
    }
}

/// Result of a route handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResponse {
    Ok(Value),
    Error { code: u16, payload: Value },
    Redirect { url: String, status: u16 },
}

impl HandlerResponse {
    /// Serialize `value` into an `Ok` response.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => HandlerResponse::Ok(v),
            Err(e) => HandlerResponse::Error {
                code: 500,
                payload: Value::String(format!("failed to serialize response: {e}")),
            },
        }
    }
}

/// A route implementation, bound to routes by name at registry build.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn call(&self, req: HandlerRequest) -> HandlerResponse;
}

/// Route handler backed by an async closure.
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`RouteHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResponse> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(HandlerRequest) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResponse> + Send,
{
    async fn call(&self, req: HandlerRequest) -> HandlerResponse {
        (self.0)(req).await
    }
}
