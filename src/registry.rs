//! # Route Registry
//!
//! The registry has an explicit two-phase lifecycle. During startup a
//! [`RegistryBuilder`] collects auth handlers, route handlers and compiled
//! [`RouteDescriptor`]s. [`RegistryBuilder::build`] binds every route to
//! its handler, precompiles its validators and returns a frozen
//! `Arc<Registry>`. Request servicing only ever reads the frozen registry,
//! so no lookup takes a lock.
//!
//! Routes are addressed three ways:
//!
//! - by uuid (every route)
//! - by endpoint name (RPC routes, one physical endpoint for all of them)
//! - by `(method, path)` for HTTP routes, where path templates may contain
//!   `{name}` or `:name` segments
//!
//! A route whose handler was never registered, or whose schemas cannot be
//! compiled, is logged and left out of the frozen registry.

use crate::dispatcher::RouteHandler;
use crate::error::RegistryError;
use crate::security::{AuthHandler, AuthRegistry};
use crate::spec::{ManifestVersion, RouteDescriptor, RouteMethod};
use crate::validator::SchemaValidator;
use crate::validator_cache::{ValidatorCache, ValidatorCacheBuilder, ValidatorKind};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A route bound to its handler.
pub struct RegisteredRoute {
    pub descriptor: RouteDescriptor,
    pub handler: Arc<dyn RouteHandler>,
}

impl fmt::Debug for RegisteredRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredRoute")
            .field("uuid", &self.descriptor.uuid)
            .field("method", &self.descriptor.method)
            .field("endpoint_or_path", &self.descriptor.endpoint_or_path)
            .field("handler_ref", &self.descriptor.handler_ref)
            .finish()
    }
}

/// Mutable startup side of the registry.
#[derive(Default)]
pub struct RegistryBuilder {
    version: ManifestVersion,
    auth: AuthRegistry,
    handlers: HashMap<String, Arc<dyn RouteHandler>>,
    routes: Vec<RouteDescriptor>,
}

impl RegistryBuilder {
    pub fn new(version: ManifestVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Register an auth handler under `id`. Ids are unique.
    pub fn add_auth_handler(
        &mut self,
        id: &str,
        handler: impl AuthHandler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        self.auth.add(id, handler)?;
        Ok(self)
    }

    /// Bind `name` to a handler. Routes find their handler through
    /// `handler_ref`. Re-registering a name replaces the earlier handler.
    pub fn register_handler(&mut self, name: &str, handler: impl RouteHandler + 'static) -> &mut Self {
        self.register_handler_arc(name, Arc::new(handler))
    }

    pub fn register_handler_arc(&mut self, name: &str, handler: Arc<dyn RouteHandler>) -> &mut Self {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            debug!(handler_name = %name, "Handler replaced");
        }
        self
    }

    /// Queue a compiled route. Uuids, RPC endpoint names and HTTP
    /// `(method, path)` pairs must be unique.
    pub fn register_route(&mut self, route: RouteDescriptor) -> Result<&mut Self, RegistryError> {
        for existing in &self.routes {
            if existing.uuid == route.uuid {
                return Err(RegistryError::DuplicateRoute(route.uuid));
            }
            if existing.method == route.method && existing.endpoint_or_path == route.endpoint_or_path {
                return Err(if route.method == RouteMethod::Rpc {
                    RegistryError::DuplicateEndpoint(route.endpoint_or_path)
                } else {
                    RegistryError::DuplicateRoute(format!(
                        "{} {}",
                        route.method, route.endpoint_or_path
                    ))
                });
            }
        }
        debug!(
            route_uuid = %route.uuid,
            method = %route.method,
            endpoint_or_path = %route.endpoint_or_path,
            "Route registered"
        );
        self.routes.push(route);
        Ok(self)
    }

    /// Queue every route in `routes`. A route that collides with one
    /// already queued is logged and skipped.
    pub fn register_routes(&mut self, routes: impl IntoIterator<Item = RouteDescriptor>) -> &mut Self {
        for route in routes {
            let uuid = route.uuid.clone();
            if let Err(e) = self.register_route(route) {
                warn!(route_uuid = %uuid, error = %e, "Skipping duplicate route");
            }
        }
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<Registry> {
        let mut cache = ValidatorCacheBuilder::new(self.version);
        let mut routes = HashMap::new();
        let mut rpc = HashMap::new();
        let mut http = Vec::new();
        let mut skipped = Vec::new();

        for descriptor in self.routes {
            let Some(handler) = self.handlers.get(&descriptor.handler_ref) else {
                let available_handlers: Vec<&String> = self.handlers.keys().collect();
                error!(
                    route_uuid = %descriptor.uuid,
                    handler_name = %descriptor.handler_ref,
                    available_handlers = ?available_handlers,
                    "Handler not found - CRITICAL"
                );
                skipped.push(descriptor.uuid);
                continue;
            };
            if !cache.precompile(&descriptor) {
                skipped.push(descriptor.uuid);
                continue;
            }
            let uuid = descriptor.uuid.clone();
            match descriptor.method {
                RouteMethod::Rpc => {
                    rpc.insert(descriptor.endpoint_or_path.clone(), uuid.clone());
                }
                method => http.push(HttpEntry {
                    method,
                    template: PathTemplate::parse(&descriptor.endpoint_or_path),
                    uuid: uuid.clone(),
                }),
            }
            routes.insert(
                uuid,
                Arc::new(RegisteredRoute {
                    descriptor,
                    handler: Arc::clone(handler),
                }),
            );
        }

        // Literal segments beat captures when two templates overlap.
        http.sort_by_key(|e| std::cmp::Reverse(e.template.literal_count()));

        info!(
            routes = routes.len(),
            rpc_endpoints = rpc.len(),
            http_routes = http.len(),
            auth_handlers = self.auth.len(),
            skipped = skipped.len(),
            "Registry frozen"
        );

        Arc::new(Registry {
            auth: self.auth,
            routes,
            rpc,
            http,
            validators: cache.freeze(),
            skipped,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateSegment {
    Literal(String),
    Capture(String),
}

#[derive(Debug, Clone)]
struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

impl PathTemplate {
    fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    TemplateSegment::Capture(name.to_string())
                } else if let Some(name) = s.strip_prefix(':') {
                    TemplateSegment::Capture(name.to_string())
                } else {
                    TemplateSegment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, TemplateSegment::Literal(_)))
            .count()
    }

    /// Match a concrete path, returning the captured segments.
    fn matches(&self, path: &str) -> Option<Map<String, Value>> {
        let path = path.split('?').next().unwrap_or(path);
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Map::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                TemplateSegment::Literal(lit) if lit == part => {}
                TemplateSegment::Literal(_) => return None,
                TemplateSegment::Capture(name) => {
                    params.insert(name.clone(), Value::String(part.to_string()));
                }
            }
        }
        Some(params)
    }
}

#[derive(Debug, Clone)]
struct HttpEntry {
    method: RouteMethod,
    template: PathTemplate,
    uuid: String,
}

/// Frozen, read-only registry shared by every request.
pub struct Registry {
    auth: AuthRegistry,
    routes: HashMap<String, Arc<RegisteredRoute>>,
    rpc: HashMap<String, String>,
    http: Vec<HttpEntry>,
    validators: ValidatorCache,
    skipped: Vec<String>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uuids: Vec<&String> = self.routes.keys().collect();
        uuids.sort();
        f.debug_struct("Registry")
            .field("auth", &self.auth)
            .field("routes", &uuids)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl Registry {
    pub fn builder(version: ManifestVersion) -> RegistryBuilder {
        RegistryBuilder::new(version)
    }

    pub fn route(&self, uuid: &str) -> Option<Arc<RegisteredRoute>> {
        self.routes.get(uuid).map(Arc::clone)
    }

    /// Route registered for an RPC endpoint name.
    pub fn rpc_route(&self, endpoint: &str) -> Option<Arc<RegisteredRoute>> {
        self.rpc.get(endpoint).and_then(|uuid| self.route(uuid))
    }

    /// Match an HTTP method and concrete path, returning the route and its
    /// path parameters.
    pub fn http_route(
        &self,
        method: RouteMethod,
        path: &str,
    ) -> Option<(Arc<RegisteredRoute>, Map<String, Value>)> {
        self.http
            .iter()
            .filter(|e| e.method == method)
            .find_map(|e| e.template.matches(path).map(|params| (&e.uuid, params)))
            .and_then(|(uuid, params)| self.route(uuid).map(|r| (r, params)))
    }

    /// Every HTTP route, for adapters that mount routes themselves.
    pub fn http_routes(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.http
            .iter()
            .filter_map(|e| self.routes.get(&e.uuid))
            .map(|r| &r.descriptor)
    }

    pub fn rpc_endpoints(&self) -> impl Iterator<Item = &str> {
        self.rpc.keys().map(String::as_str)
    }

    pub fn auth(&self) -> &AuthRegistry {
        &self.auth
    }

    pub fn validator(&self, uuid: &str, kind: ValidatorKind) -> Option<Arc<SchemaValidator>> {
        self.validators.get(uuid, kind)
    }

    pub fn version(&self) -> &ManifestVersion {
        self.validators.version()
    }

    /// Uuids of routes left out at build time.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HandlerRequest, HandlerResponse};
    use crate::security::AnonymousAuth;
    use crate::spec::{build_route, FieldDescription, RouteSource, TypeDescription};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl RouteHandler for Echo {
        async fn call(&self, req: HandlerRequest) -> HandlerResponse {
            HandlerResponse::Ok(req.request)
        }
    }

    fn route(export: &str, method: &str, target: &str) -> RouteDescriptor {
        let rpc = method == "rpc";
        build_route(&RouteSource {
            source_path: "api/users.ts".into(),
            export_name: export.into(),
            method: method.into(),
            path: (!rpc).then(|| target.to_string()),
            endpoint: rpc.then(|| target.to_string()),
            auth: None,
            permission: None,
            handler: None,
            request: Some(TypeDescription {
                name: "Req".into(),
                fields: vec![FieldDescription::primitive("id", "string")],
                comment: None,
            }),
            response: Some(TypeDescription {
                name: "Res".into(),
                fields: vec![],
                comment: None,
            }),
        })
        .unwrap()
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let mut builder = RegistryBuilder::default();
        builder.add_auth_handler("default", AnonymousAuth).unwrap();
        assert!(matches!(
            builder.add_auth_handler("default", AnonymousAuth),
            Err(RegistryError::AuthHandlerAlreadyExists(_))
        ));

        builder.register_route(route("get", "rpc", "users.get")).unwrap();
        assert!(matches!(
            builder.register_route(route("get", "rpc", "users.other")),
            Err(RegistryError::DuplicateRoute(_))
        ));
        assert_eq!(
            builder
                .register_route(route("get2", "rpc", "users.get"))
                .map(|_| ())
                .unwrap_err(),
            RegistryError::DuplicateEndpoint("users.get".into())
        );
    }

    #[test]
    fn batch_registration_skips_duplicates_and_keeps_going() {
        let mut builder = RegistryBuilder::default();
        let first = route("getUser", "rpc", "users.get");
        let clash = route("getUserAgain", "rpc", "users.get");
        let after = route("listUsers", "rpc", "users.list");
        for r in [&first, &clash, &after] {
            builder.register_handler(&r.handler_ref, Echo);
        }
        builder.register_routes([first.clone(), clash.clone(), after.clone()]);

        let registry = builder.build();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.rpc_route("users.get").unwrap().descriptor.uuid,
            first.uuid
        );
        assert!(registry.rpc_route("users.list").is_some());
        assert!(registry.route(&clash.uuid).is_none());
    }

    #[test]
    fn routes_without_handlers_are_skipped() {
        let mut builder = RegistryBuilder::default();
        let bound = route("getUser", "rpc", "users.get");
        let unbound = route("listUsers", "rpc", "users.list");
        builder.register_handler(&bound.handler_ref, Echo);
        builder.register_routes([bound.clone(), unbound.clone()]);

        let registry = builder.build();
        assert_eq!(registry.len(), 1);
        assert!(registry.rpc_route("users.get").is_some());
        assert!(registry.rpc_route("users.list").is_none());
        assert_eq!(registry.skipped(), &[unbound.uuid.clone()]);
        assert!(registry
            .validator(&bound.uuid, ValidatorKind::Request)
            .is_some());
    }

    #[test]
    fn http_routes_match_templates() {
        let mut builder = RegistryBuilder::default();
        let by_id = route("getUser", "get", "/users/{id}");
        let me = route("getMe", "get", "/users/me");
        let legacy = route("delUser", "delete", "/users/:id");
        for r in [&by_id, &me, &legacy] {
            builder.register_handler(&r.handler_ref, Echo);
        }
        builder.register_routes([by_id.clone(), me.clone(), legacy.clone()]);
        let registry = builder.build();

        let (r, params) = registry.http_route(RouteMethod::Get, "/users/42").unwrap();
        assert_eq!(r.descriptor.uuid, by_id.uuid);
        assert_eq!(params.get("id"), Some(&Value::String("42".into())));

        let (r, params) = registry.http_route(RouteMethod::Get, "/users/me?x=1").unwrap();
        assert_eq!(r.descriptor.uuid, me.uuid);
        assert!(params.is_empty());

        let (r, _) = registry.http_route(RouteMethod::Delete, "/users/7").unwrap();
        assert_eq!(r.descriptor.uuid, legacy.uuid);

        assert!(registry.http_route(RouteMethod::Post, "/users/7").is_none());
        assert!(registry.http_route(RouteMethod::Get, "/users/7/posts").is_none());
        assert_eq!(registry.http_routes().count(), 3);
    }
}
