//! RPC wire envelopes.
//!
//! Every RPC call arrives at one physical endpoint as
//! `{ id, endpoint, authorization, params }` and is answered with
//! `{ id, result?, error?: { appCode, message } }`. Errors produced by the
//! engine itself (bad envelope, unknown endpoint, auth, validation) carry
//! `id: -1`; errors returned by a handler keep the caller's id.

use crate::error::{CoreErrorCode, DispatchError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Id used on engine-produced error envelopes.
pub const ERROR_ENVELOPE_ID: i64 = -1;

/// Inbound RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequestEnvelope {
    pub id: i64,
    pub endpoint: String,
    pub authorization: String,
    #[serde(default)]
    pub params: Value,
}

/// Error member of an RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub app_code: u16,
    pub message: String,
}

/// Outbound RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponseEnvelope {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponseEnvelope {
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: i64, app_code: u16, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                app_code,
                message: message.into(),
            }),
        }
    }

    /// Engine-produced error envelope (`id: -1`).
    pub fn from_dispatch_error(err: &DispatchError) -> Self {
        Self::failure(ERROR_ENVELOPE_ID, err.rpc_code().as_u16(), err.rpc_message())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> Option<CoreErrorCode> {
        self.error
            .as_ref()
            .and_then(|e| CoreErrorCode::from_u16(e.app_code))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope field '{0}' is missing or has the wrong type")]
    BadField(&'static str),
}

impl From<EnvelopeError> for DispatchError {
    fn from(err: EnvelopeError) -> Self {
        DispatchError::RpcPacketMalformed(err.to_string())
    }
}

/// Parse an inbound envelope, naming the first offending field on failure.
pub fn parse_envelope(value: &Value) -> Result<RpcRequestEnvelope, EnvelopeError> {
    let obj = value.as_object().ok_or(EnvelopeError::NotAnObject)?;
    let id = obj
        .get("id")
        .and_then(Value::as_i64)
        .ok_or(EnvelopeError::BadField("id"))?;
    let endpoint = obj
        .get("endpoint")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::BadField("endpoint"))?;
    let authorization = obj
        .get("authorization")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::BadField("authorization"))?;
    Ok(RpcRequestEnvelope {
        id,
        endpoint: endpoint.to_string(),
        authorization: authorization.to_string(),
        params: obj.get("params").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_envelope() {
        let env = parse_envelope(&json!({
            "id": 3, "endpoint": "users.get", "authorization": "t", "params": {"id": 1}
        }))
        .unwrap();
        assert_eq!(env.id, 3);
        assert_eq!(env.endpoint, "users.get");
        assert_eq!(env.params, json!({"id": 1}));
    }

    #[test]
    fn params_are_optional() {
        let env =
            parse_envelope(&json!({"id": 1, "endpoint": "ping", "authorization": ""})).unwrap();
        assert_eq!(env.params, Value::Null);
    }

    #[test]
    fn malformed_envelopes_name_the_field() {
        assert_eq!(
            parse_envelope(&json!([1, 2])).unwrap_err(),
            EnvelopeError::NotAnObject
        );
        assert_eq!(
            parse_envelope(&json!({"id": "x", "endpoint": "a", "authorization": ""})).unwrap_err(),
            EnvelopeError::BadField("id")
        );
        assert_eq!(
            parse_envelope(&json!({"id": 1, "authorization": ""})).unwrap_err(),
            EnvelopeError::BadField("endpoint")
        );
    }

    #[test]
    fn response_serialization_omits_absent_members() {
        let ok = serde_json::to_value(RpcResponseEnvelope::success(1, json!({"a": 1}))).unwrap();
        assert_eq!(ok, json!({"id": 1, "result": {"a": 1}}));

        let err = RpcResponseEnvelope::from_dispatch_error(&DispatchError::RpcEndpointDoesNotExist(
            "nope".into(),
        ));
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["id"], json!(-1));
        assert_eq!(v["error"]["appCode"], json!(1003));
        assert!(v.get("result").is_none());
        assert_eq!(err.error_code(), Some(CoreErrorCode::RpcEndpointDoesNotExist));
    }
}
