//! # Validator Cache
//!
//! Precompiled request validators, one per registered route, keyed by route
//! uuid. The cache is filled once while the registry is built and is never
//! written afterwards, so request-time lookups take no lock.
//!
//! Cache keys have the form `{manifest_hash}:{route_uuid}:{kind}`, so two
//! caches built from different manifests never share entries.

use crate::spec::{ManifestVersion, RouteDescriptor};
use crate::validator::SchemaValidator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Which root of a route a validator checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidatorKind {
    Request,
    Response,
}

impl ValidatorKind {
    fn as_str(self) -> &'static str {
        match self {
            ValidatorKind::Request => "request",
            ValidatorKind::Response => "response",
        }
    }
}

/// Frozen map of compiled validators.
#[derive(Debug, Clone, Default)]
pub struct ValidatorCache {
    version: ManifestVersion,
    validators: HashMap<String, Arc<SchemaValidator>>,
}

/// Mutable side of the cache, used only during registry build.
#[derive(Debug, Default)]
pub struct ValidatorCacheBuilder {
    version: ManifestVersion,
    validators: HashMap<String, Arc<SchemaValidator>>,
}

impl ValidatorCacheBuilder {
    pub fn new(version: ManifestVersion) -> Self {
        Self {
            version,
            validators: HashMap::new(),
        }
    }

    fn key(version: &ManifestVersion, uuid: &str, kind: ValidatorKind) -> String {
        format!("{}:{}:{}", version.hash, uuid, kind.as_str())
    }

    /// Compile both validators of `route`. Returns `false` when either
    /// schema cannot be compiled; nothing is cached for the route then.
    pub fn precompile(&mut self, route: &RouteDescriptor) -> bool {
        let compiled = SchemaValidator::compile(&route.request.schema).and_then(|req| {
            SchemaValidator::compile(&route.response.schema).map(|resp| (req, resp))
        });
        match compiled {
            Ok((request, response)) => {
                for (kind, validator) in [
                    (ValidatorKind::Request, request),
                    (ValidatorKind::Response, response),
                ] {
                    let key = Self::key(&self.version, &route.uuid, kind);
                    debug!(cache_key = %key, "Schema validator compiled");
                    self.validators.insert(key, Arc::new(validator));
                }
                true
            }
            Err(e) => {
                error!(
                    route_uuid = %route.uuid,
                    error = %e,
                    "Failed to compile JSON Schema"
                );
                false
            }
        }
    }

    pub fn freeze(self) -> ValidatorCache {
        info!(
            manifest_hash = %self.version,
            validators = self.validators.len(),
            "Validator cache frozen"
        );
        ValidatorCache {
            version: self.version,
            validators: self.validators,
        }
    }
}

impl ValidatorCache {
    pub fn get(&self, uuid: &str, kind: ValidatorKind) -> Option<Arc<SchemaValidator>> {
        let key = ValidatorCacheBuilder::key(&self.version, uuid, kind);
        self.validators.get(&key).map(Arc::clone)
    }

    pub fn version(&self) -> &ManifestVersion {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{build_route, FieldDescription, RouteSource, TypeDescription};

    fn route() -> RouteDescriptor {
        build_route(&RouteSource {
            source_path: "api/ping.ts".into(),
            export_name: "ping".into(),
            method: "get".into(),
            path: Some("/ping".into()),
            endpoint: None,
            auth: None,
            permission: None,
            handler: None,
            request: Some(TypeDescription {
                name: "PingRequest".into(),
                fields: vec![FieldDescription::primitive("n", "number")],
                comment: None,
            }),
            response: Some(TypeDescription {
                name: "PingResponse".into(),
                fields: vec![FieldDescription::primitive("pong", "boolean")],
                comment: None,
            }),
        })
        .unwrap()
    }

    #[test]
    fn precompiles_request_and_response() {
        let route = route();
        let mut builder = ValidatorCacheBuilder::new(ManifestVersion::from_content(b"v1"));
        assert!(builder.precompile(&route));
        let cache = builder.freeze();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&route.uuid, ValidatorKind::Request).is_some());
        assert!(cache.get(&route.uuid, ValidatorKind::Response).is_some());
        assert!(cache.get("missing", ValidatorKind::Request).is_none());
    }

    #[test]
    fn lookups_share_the_same_validator() {
        let route = route();
        let mut builder = ValidatorCacheBuilder::default();
        builder.precompile(&route);
        let cache = builder.freeze();
        let a = cache.get(&route.uuid, ValidatorKind::Request).unwrap();
        let b = cache.get(&route.uuid, ValidatorKind::Request).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
