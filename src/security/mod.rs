//! # Security Module
//!
//! Authentication and authorisation seams of the dispatch engine.
//!
//! ## Auth handlers
//!
//! An [`AuthHandler`] receives the raw authorization credential of a call
//! (the `authorization` header for HTTP, the envelope's `authorization`
//! field for RPC) and either rejects it or returns an [`AuthContext`]: a
//! bag of metadata such as the resolved `userId`. The context is handed to
//! the permission check and to the route handler.
//!
//! Handlers are registered by string id in an [`AuthRegistry`]. A route
//! names the id it needs; routes that name none use the configured default
//! id. A route whose id has no handler is rejected (fail-closed).
//!
//! ```rust
//! use routewitch::security::{auth_fn, AuthContext, AuthRejection, AuthRegistry};
//!
//! let mut auth = AuthRegistry::default();
//! auth.add(
//!     "default",
//!     auth_fn(|credential: Option<String>| async move {
//!         match credential.as_deref() {
//!             Some("let-me-in") => Ok(AuthContext::new().with("userId", "u1")),
//!             _ => Err(AuthRejection::Invalid("bad token".into())),
//!         }
//!     }),
//! )
//! .unwrap();
//! assert!(auth.add("default", routewitch::security::AnonymousAuth).is_err());
//! ```
//!
//! ## Permission checks
//!
//! A single, optional [`PermissionCheck`] is configured globally. It sees
//! the auth context and the route's permission tag and answers allow/deny.
//! [`ScopePermissionCheck`] grants a tag when it appears in the context's
//! whitespace-separated `scope` claim.

mod bearer_jwt;

pub use bearer_jwt::BearerJwtAuth;

use crate::error::RegistryError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Request-scoped identity metadata produced by an auth handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthContext {
    meta: Map<String, Value>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(meta: Map<String, Value>) -> Self {
        Self { meta }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Resolved user id, if the handler provided one.
    pub fn user_id(&self) -> Option<&str> {
        self.meta.get("userId").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.meta)
    }
}

/// Why an auth handler refused a credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("missing credentials")]
    MissingCredential,

    #[error("{0}")]
    Invalid(String),
}

/// Validates a raw credential string.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    async fn authenticate(&self, credential: Option<&str>) -> Result<AuthContext, AuthRejection>;
}

/// Global allow/deny decision for a route's permission tag.
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    async fn check(&self, ctx: &AuthContext, permission: Option<&str>) -> bool;
}

/// Accepts every call with an empty context.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuth;

#[async_trait]
impl AuthHandler for AnonymousAuth {
    async fn authenticate(&self, _credential: Option<&str>) -> Result<AuthContext, AuthRejection> {
        Ok(AuthContext::new())
    }
}

/// Auth handler backed by an async closure.
pub struct FnAuth<F>(F);

/// Wrap an async closure taking the credential as an [`AuthHandler`].
pub fn auth_fn<F, Fut>(f: F) -> FnAuth<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AuthContext, AuthRejection>> + Send,
{
    FnAuth(f)
}

#[async_trait]
impl<F, Fut> AuthHandler for FnAuth<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AuthContext, AuthRejection>> + Send,
{
    async fn authenticate(&self, credential: Option<&str>) -> Result<AuthContext, AuthRejection> {
        (self.0)(credential.map(str::to_string)).await
    }
}

/// Permission check backed by an async closure.
pub struct FnPermission<F>(F);

/// Wrap an async closure `(context, permission tag) -> allowed`.
pub fn permission_fn<F, Fut>(f: F) -> FnPermission<F>
where
    F: Fn(AuthContext, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    FnPermission(f)
}

#[async_trait]
impl<F, Fut> PermissionCheck for FnPermission<F>
where
    F: Fn(AuthContext, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn check(&self, ctx: &AuthContext, permission: Option<&str>) -> bool {
        (self.0)(ctx.clone(), permission.map(str::to_string)).await
    }
}

/// Grants a permission tag when it is listed in the context's `scope`.
/// Routes without a tag are always allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopePermissionCheck;

#[async_trait]
impl PermissionCheck for ScopePermissionCheck {
    async fn check(&self, ctx: &AuthContext, permission: Option<&str>) -> bool {
        let Some(required) = permission else {
            return true;
        };
        ctx.get("scope")
            .and_then(Value::as_str)
            .map(|scopes| scopes.split_whitespace().any(|s| s == required))
            .unwrap_or(false)
    }
}

/// Auth handlers keyed by id.
#[derive(Clone, Default)]
pub struct AuthRegistry {
    handlers: HashMap<String, Arc<dyn AuthHandler>>,
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("AuthRegistry").field("ids", &ids).finish()
    }
}

impl AuthRegistry {
    /// Register `handler` under `id`. Ids are unique.
    pub fn add(
        &mut self,
        id: &str,
        handler: impl AuthHandler + 'static,
    ) -> Result<(), RegistryError> {
        self.add_arc(id, Arc::new(handler))
    }

    pub fn add_arc(&mut self, id: &str, handler: Arc<dyn AuthHandler>) -> Result<(), RegistryError> {
        if self.handlers.contains_key(id) {
            return Err(RegistryError::AuthHandlerAlreadyExists(id.to_string()));
        }
        info!(auth_id = %id, "Auth handler registered");
        self.handlers.insert(id.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AuthHandler>> {
        self.handlers.get(id).map(Arc::clone)
    }

    /// Handler for a route's auth id, falling back to `default_id`.
    pub fn resolve(&self, auth_id: Option<&str>, default_id: &str) -> Option<Arc<dyn AuthHandler>> {
        self.get(auth_id.unwrap_or(default_id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let mut reg = AuthRegistry::default();
        reg.add("default", AnonymousAuth).unwrap();
        let err = reg.add("default", AnonymousAuth).unwrap_err();
        assert_eq!(err, RegistryError::AuthHandlerAlreadyExists("default".into()));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn resolve_falls_back_to_default_id() {
        let mut reg = AuthRegistry::default();
        reg.add("default", AnonymousAuth).unwrap();
        assert!(reg.resolve(None, "default").is_some());
        assert!(reg.resolve(Some("admin"), "default").is_none());
    }

    #[tokio::test]
    async fn closure_handlers_receive_the_credential() {
        let auth = auth_fn(|cred: Option<String>| async move {
            match cred {
                Some(c) if c == "ok" => Ok(AuthContext::new().with("userId", "u1")),
                Some(_) => Err(AuthRejection::Invalid("nope".into())),
                None => Err(AuthRejection::MissingCredential),
            }
        });
        let ctx = auth.authenticate(Some("ok")).await.unwrap();
        assert_eq!(ctx.user_id(), Some("u1"));
        assert_eq!(
            auth.authenticate(None).await.unwrap_err(),
            AuthRejection::MissingCredential
        );
    }

    #[tokio::test]
    async fn scope_permission_check() {
        let ctx = AuthContext::new().with("scope", "read write");
        assert!(ScopePermissionCheck.check(&ctx, Some("write")).await);
        assert!(!ScopePermissionCheck.check(&ctx, Some("admin")).await);
        assert!(ScopePermissionCheck.check(&ctx, None).await);
        assert!(!ScopePermissionCheck.check(&AuthContext::new(), Some("read")).await);
    }
}
