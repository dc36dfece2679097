//! Route build pass: turns [`RouteSource`] records into immutable
//! [`RouteDescriptor`]s.
//!
//! Each route is compiled independently. A route whose request or response
//! shape fails to compile is logged, reported as a [`BuildIssue`] and left
//! out; the remaining routes still build.

use super::annotation::parse_annotations;
use super::schema::compile_schema;
use super::sources::compile_source_list;
use super::types::{CompiledShape, RouteDescriptor, RouteMethod, TypeDescription};
use crate::error::{BuildError, ShapeRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info};

/// One route as reported by the external source parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSource {
    /// Module the route was declared in.
    pub source_path: String,
    /// Exported symbol the route was declared under.
    pub export_name: String,
    pub method: String,
    /// HTTP path, for path-routed methods.
    #[serde(default)]
    pub path: Option<String>,
    /// Endpoint name, for RPC routes.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub permission: Option<String>,
    /// Handler name to bind at registry build. Defaults to the uuid.
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub request: Option<TypeDescription>,
    #[serde(default)]
    pub response: Option<TypeDescription>,
}

impl RouteSource {
    /// Human-readable label used in logs and issues.
    pub fn label(&self) -> String {
        format!("{}#{}", self.source_path, self.export_name)
    }
}

/// A non-fatal problem found while building routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildIssue {
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl BuildIssue {
    pub fn new(
        location: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BuildIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    fn from_error(location: &str, err: &BuildError) -> Self {
        let kind = match err {
            BuildError::SchemaExtraction { .. } => "SchemaExtraction",
            BuildError::UnsupportedType { .. } => "UnsupportedType",
            BuildError::TypeNotDefined { .. } => "TypeNotDefined",
            BuildError::InvalidRoute { .. } => "InvalidRoute",
        };
        BuildIssue::new(location, kind, err.to_string())
    }
}

impl fmt::Display for BuildIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Result of a build pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub routes: Vec<RouteDescriptor>,
    pub issues: Vec<BuildIssue>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Stable route identifier derived from where the route was declared.
///
/// Path separators, whitespace and dots in `source_path` become `_`.
pub fn route_uuid(source_path: &str, export_name: &str) -> String {
    let sanitized: String = source_path
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("{sanitized}_{export_name}")
}

/// Compile one type description into schema, annotations and source list.
pub fn compile_shape(root: &str, desc: &TypeDescription) -> Result<CompiledShape, BuildError> {
    let schema = compile_schema(root, desc)?;
    let annotations = desc
        .comment
        .as_deref()
        .map(parse_annotations)
        .unwrap_or_default();
    let source_list = compile_source_list(&schema, &annotations);
    Ok(CompiledShape {
        schema,
        annotations,
        source_list,
    })
}

/// Build a single route descriptor.
pub fn build_route(src: &RouteSource) -> Result<RouteDescriptor, BuildError> {
    let label = src.label();
    let method: RouteMethod = src.method.parse().map_err(|reason| BuildError::InvalidRoute {
        route: label.clone(),
        reason,
    })?;

    let endpoint_or_path = match method {
        RouteMethod::Rpc => {
            let endpoint = src.endpoint.as_deref().map(str::trim).unwrap_or_default();
            if endpoint.is_empty() || endpoint.contains(char::is_whitespace) {
                return Err(BuildError::InvalidRoute {
                    route: label,
                    reason: "RPC route needs a non-empty endpoint name without whitespace"
                        .to_string(),
                });
            }
            endpoint.to_string()
        }
        _ => match src.path.as_deref().map(str::trim) {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => {
                return Err(BuildError::InvalidRoute {
                    route: label,
                    reason: "HTTP route needs a path starting with '/'".to_string(),
                })
            }
        },
    };

    let request_desc = src.request.as_ref().ok_or_else(|| BuildError::TypeNotDefined {
        route: label.clone(),
        role: ShapeRole::Request,
    })?;
    let response_desc = src.response.as_ref().ok_or_else(|| BuildError::TypeNotDefined {
        route: label.clone(),
        role: ShapeRole::Response,
    })?;

    let request = compile_shape("request", request_desc)?;
    let response = compile_shape("response", response_desc)?;

    let uuid = route_uuid(&src.source_path, &src.export_name);
    let handler_ref = src.handler.clone().unwrap_or_else(|| uuid.clone());

    debug!(
        route = %label,
        method = %method,
        endpoint_or_path = %endpoint_or_path,
        request_fields = request.schema.len(),
        response_fields = response.schema.len(),
        "Route compiled"
    );

    Ok(RouteDescriptor {
        method,
        endpoint_or_path,
        auth_id: src.auth.clone(),
        permission_tag: src.permission.clone(),
        request,
        response,
        handler_ref,
        uuid,
    })
}

/// Build every route, skipping (and reporting) the ones that fail.
pub fn build_routes(sources: &[RouteSource]) -> BuildReport {
    let mut report = BuildReport::default();
    for src in sources {
        match build_route(src) {
            Ok(route) => report.routes.push(route),
            Err(err) => {
                let label = src.label();
                error!(route = %label, error = %err, "Route skipped");
                report.issues.push(BuildIssue::from_error(&label, &err));
            }
        }
    }
    info!(
        routes = report.routes.len(),
        skipped = report.issues.len(),
        "Route build complete"
    );
    report
}
