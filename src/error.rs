//! Error taxonomy shared by the build pass and the dispatch engine.
//!
//! Build-time errors ([`BuildError`]) skip the offending route and never
//! abort the whole build. Request-time errors ([`DispatchError`]) are always
//! converted into a transport envelope: an HTTP error body or an RPC
//! `{error}` object carrying a numeric [`CoreErrorCode`].

use crate::validator::FieldIssue;
use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable numeric application codes carried in error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CoreErrorCode {
    AuthHandlerAlreadyExists = 0,
    NoAuthHandlerDefined = 1,
    ValidationFailed = 2,
    AuthenticationFailed = 3,
    PermissionCheckFailed = 4,
    DeadlineExceeded = 5,
    InternalError = 6,
    RouteNotFound = 7,

    RpcPacketMalformed = 1000,
    RpcAuthNotExists = 1001,
    RpcAuthNotAllowed = 1002,
    RpcEndpointDoesNotExist = 1003,
}

impl CoreErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        use CoreErrorCode::*;
        let code = match code {
            0 => AuthHandlerAlreadyExists,
            1 => NoAuthHandlerDefined,
            2 => ValidationFailed,
            3 => AuthenticationFailed,
            4 => PermissionCheckFailed,
            5 => DeadlineExceeded,
            6 => InternalError,
            7 => RouteNotFound,
            1000 => RpcPacketMalformed,
            1001 => RpcAuthNotExists,
            1002 => RpcAuthNotAllowed,
            1003 => RpcEndpointDoesNotExist,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for CoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u16())
    }
}

impl Serialize for CoreErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> Deserialize<'de> for CoreErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        CoreErrorCode::from_u16(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {code}")))
    }
}

/// Which compiled root a build error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRole {
    Request,
    Response,
}

impl fmt::Display for ShapeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRole::Request => f.write_str("request"),
            ShapeRole::Response => f.write_str("response"),
        }
    }
}

/// Failures while compiling one route. The route is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Malformed type shape: missing identifier, duplicate sibling, too deep.
    #[error("schema extraction failed for '{type_name}': {reason}")]
    SchemaExtraction { type_name: String, reason: String },

    /// Union or intersection field type.
    #[error("unsupported union/intersection type on field '{field}' of '{type_name}'")]
    UnsupportedType { type_name: String, field: String },

    /// Route declares no request or response shape.
    #[error("{role} type not defined for route '{route}'")]
    TypeNotDefined { route: String, role: ShapeRole },

    /// Route metadata (method, path, endpoint) is unusable.
    #[error("invalid route '{route}': {reason}")]
    InvalidRoute { route: String, reason: String },
}

/// Failures while populating the registry at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("auth handler '{0}' already exists")]
    AuthHandlerAlreadyExists(String),

    #[error("route '{0}' is already registered")]
    DuplicateRoute(String),

    #[error("RPC endpoint '{0}' is already registered")]
    DuplicateEndpoint(String),
}

impl RegistryError {
    pub fn code(&self) -> Option<CoreErrorCode> {
        match self {
            RegistryError::AuthHandlerAlreadyExists(_) => {
                Some(CoreErrorCode::AuthHandlerAlreadyExists)
            }
            _ => None,
        }
    }
}

/// Request-scoped failures, each mapped onto an HTTP status and an RPC code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("no auth handler defined for '{0}'")]
    AuthHandlerNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("User permission check failed")]
    PermissionCheckFailed,

    #[error("validation failed for {} field(s)", .0.len())]
    ValidationFailed(Vec<FieldIssue>),

    #[error("no route '{0}'")]
    RouteNotFound(String),

    #[error("RPC endpoint '{0}' does not exist")]
    RpcEndpointDoesNotExist(String),

    #[error("malformed RPC packet: {0}")]
    RpcPacketMalformed(String),

    #[error("deadline of {}ms exceeded", .0.as_millis())]
    DeadlineExceeded(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Application code used in HTTP error bodies.
    pub fn code(&self) -> CoreErrorCode {
        match self {
            DispatchError::AuthHandlerNotFound(_) => CoreErrorCode::NoAuthHandlerDefined,
            DispatchError::AuthenticationFailed(_) => CoreErrorCode::AuthenticationFailed,
            DispatchError::PermissionCheckFailed => CoreErrorCode::PermissionCheckFailed,
            DispatchError::ValidationFailed(_) => CoreErrorCode::ValidationFailed,
            DispatchError::RouteNotFound(_) => CoreErrorCode::RouteNotFound,
            DispatchError::RpcEndpointDoesNotExist(_) => CoreErrorCode::RpcEndpointDoesNotExist,
            DispatchError::RpcPacketMalformed(_) => CoreErrorCode::RpcPacketMalformed,
            DispatchError::DeadlineExceeded(_) => CoreErrorCode::DeadlineExceeded,
            DispatchError::Internal(_) => CoreErrorCode::InternalError,
        }
    }

    /// Application code used in RPC error envelopes.
    pub fn rpc_code(&self) -> CoreErrorCode {
        match self {
            DispatchError::AuthHandlerNotFound(_) => CoreErrorCode::RpcAuthNotExists,
            DispatchError::AuthenticationFailed(_) => CoreErrorCode::RpcAuthNotAllowed,
            DispatchError::ValidationFailed(_) => CoreErrorCode::RpcPacketMalformed,
            DispatchError::RouteNotFound(_) => CoreErrorCode::RpcEndpointDoesNotExist,
            other => other.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::AuthHandlerNotFound(_) | DispatchError::AuthenticationFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            DispatchError::PermissionCheckFailed => StatusCode::FORBIDDEN,
            DispatchError::ValidationFailed(_) | DispatchError::RpcPacketMalformed(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::RouteNotFound(_) | DispatchError::RpcEndpointDoesNotExist(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `message` member of the HTTP error body: the issue list for
    /// validation failures, the display text otherwise.
    pub fn message(&self) -> Value {
        match self {
            DispatchError::ValidationFailed(issues) => json!(issues),
            other => Value::String(other.to_string()),
        }
    }

    /// Plain-text message for RPC envelopes.
    pub fn rpc_message(&self) -> String {
        match self {
            DispatchError::ValidationFailed(issues) => {
                serde_json::to_string(issues).unwrap_or_else(|_| self.to_string())
            }
            other => other.to_string(),
        }
    }

    /// HTTP error body `{ code, message }`.
    pub fn to_http_body(&self) -> Value {
        json!({ "code": self.code(), "message": self.message() })
    }
}
