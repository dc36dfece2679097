use crate::dispatcher::{HandlerRequest, HandlerResponse, RouteHandler};
use crate::error::CoreErrorCode;
use crate::ids::RequestId;
use crate::registry::RegistryBuilder;
use crate::security::AuthContext;
use crate::spec::RouteMethod;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// A handler working on serde types instead of raw JSON.
///
/// The validated request object is deserialized into `Request`. Returning
/// `Err` short-circuits with any [`HandlerResponse`], typically built with
/// [`TypedHandlerRequest::error`].
#[async_trait]
pub trait TypedHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(
        &self,
        req: TypedHandlerRequest<Self::Request>,
    ) -> Result<Self::Response, HandlerResponse>;
}

/// Typed counterpart of [`HandlerRequest`].
#[derive(Debug, Clone)]
pub struct TypedHandlerRequest<T> {
    pub request_id: RequestId,
    pub route_uuid: String,
    pub method: RouteMethod,
    pub meta: AuthContext,
    pub data: T,
}

impl<T> TypedHandlerRequest<T> {
    pub fn error(&self, code: u16, payload: impl Into<Value>) -> HandlerResponse {
        HandlerResponse::Error {
            code,
            payload: payload.into(),
        }
    }

    pub fn redirect(&self, url: impl Into<String>, status: u16) -> HandlerResponse {
        HandlerResponse::Redirect {
            url: url.into(),
            status,
        }
    }
}

impl<T: DeserializeOwned> TryFrom<HandlerRequest> for TypedHandlerRequest<T> {
    type Error = serde_json::Error;

    fn try_from(req: HandlerRequest) -> Result<Self, Self::Error> {
        let data = serde_json::from_value(req.request)?;
        Ok(Self {
            request_id: req.request_id,
            route_uuid: req.route_uuid,
            method: req.method,
            meta: req.meta,
            data,
        })
    }
}

/// Adapter exposing a [`TypedHandler`] as a [`RouteHandler`].
pub struct Typed<H>(pub H);

fn conversion_error(method: RouteMethod, err: &serde_json::Error) -> HandlerResponse {
    let message = format!("request does not match handler type: {err}");
    match method {
        RouteMethod::Rpc => HandlerResponse::Error {
            code: CoreErrorCode::RpcPacketMalformed.as_u16(),
            payload: Value::String(message),
        },
        _ => HandlerResponse::Error {
            code: 400,
            payload: json!({ "code": CoreErrorCode::ValidationFailed, "message": message }),
        },
    }
}

#[async_trait]
impl<H: TypedHandler> RouteHandler for Typed<H> {
    async fn call(&self, req: HandlerRequest) -> HandlerResponse {
        let method = req.method;
        let typed = match TypedHandlerRequest::<H::Request>::try_from(req) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "Typed request conversion failed");
                return conversion_error(method, &e);
            }
        };
        match self.0.handle(typed).await {
            Ok(resp) => HandlerResponse::json(&resp),
            Err(early) => early,
        }
    }
}

impl RegistryBuilder {
    /// Bind `name` to a typed handler.
    pub fn register_typed<H: TypedHandler>(&mut self, name: &str, handler: H) -> &mut Self {
        self.register_handler(name, Typed(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Add {
        a: i64,
        b: i64,
    }

    #[derive(Serialize)]
    struct Sum {
        sum: i64,
    }

    struct Adder;

    #[async_trait]
    impl TypedHandler for Adder {
        type Request = Add;
        type Response = Sum;

        async fn handle(&self, req: TypedHandlerRequest<Add>) -> Result<Sum, HandlerResponse> {
            if req.data.a < 0 {
                return Err(req.error(422, "negative"));
            }
            Ok(Sum {
                sum: req.data.a + req.data.b,
            })
        }
    }

    fn request(method: RouteMethod, body: Value) -> HandlerRequest {
        HandlerRequest {
            request_id: RequestId::new(),
            route_uuid: "calc_add".into(),
            method,
            request: body,
            meta: AuthContext::new(),
        }
    }

    #[tokio::test]
    async fn converts_request_and_response() {
        let resp = Typed(Adder)
            .call(request(RouteMethod::Post, json!({"a": 2, "b": 3})))
            .await;
        assert_eq!(resp, HandlerResponse::Ok(json!({"sum": 5})));
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let resp = Typed(Adder)
            .call(request(RouteMethod::Post, json!({"a": -1, "b": 3})))
            .await;
        assert_eq!(
            resp,
            HandlerResponse::Error {
                code: 422,
                payload: json!("negative")
            }
        );
    }

    #[tokio::test]
    async fn conversion_failure_depends_on_transport() {
        let http = Typed(Adder)
            .call(request(RouteMethod::Get, json!({"a": "x"})))
            .await;
        let HandlerResponse::Error { code, payload } = http else {
            panic!("expected error");
        };
        assert_eq!(code, 400);
        assert_eq!(payload["code"], json!(2));

        let rpc = Typed(Adder)
            .call(request(RouteMethod::Rpc, json!({"a": 1})))
            .await;
        assert!(matches!(rpc, HandlerResponse::Error { code: 1000, .. }));
    }
}
