//! Shared fixtures for integration tests.
#![allow(dead_code)]

use routewitch::dispatcher::{Dispatcher, RouteHandler};
use routewitch::registry::RegistryBuilder;
use routewitch::runtime_config::RuntimeConfig;
use routewitch::security::AuthHandler;
use routewitch::spec::{
    build_route, FieldDescription, ManifestVersion, RouteDescriptor, RouteSource, TypeDescription,
};

/// Route source with a request type and an empty response type.
pub fn source(
    export: &str,
    method: &str,
    target: &str,
    fields: Vec<FieldDescription>,
    comment: Option<&str>,
) -> RouteSource {
    let rpc = method.eq_ignore_ascii_case("rpc");
    RouteSource {
        source_path: "api/users.ts".into(),
        export_name: export.into(),
        method: method.into(),
        path: (!rpc).then(|| target.to_string()),
        endpoint: rpc.then(|| target.to_string()),
        auth: None,
        permission: None,
        handler: None,
        request: Some(TypeDescription {
            name: format!("{export}Request"),
            fields,
            comment: comment.map(str::to_string),
        }),
        response: Some(TypeDescription {
            name: format!("{export}Response"),
            fields: vec![],
            comment: None,
        }),
    }
}

pub fn route(src: &RouteSource) -> RouteDescriptor {
    build_route(src).expect("route should build")
}

/// Dispatcher over a single route registered under the `default` auth id.
pub fn dispatcher_for(
    route: RouteDescriptor,
    auth: impl AuthHandler + 'static,
    handler: impl RouteHandler + 'static,
    config: RuntimeConfig,
) -> Dispatcher {
    let mut builder = RegistryBuilder::new(ManifestVersion::from_content(b"tests"));
    builder
        .add_auth_handler("default", auth)
        .expect("fresh auth id");
    let handler_ref = route.handler_ref.clone();
    builder.register_handler(&handler_ref, handler);
    builder.register_route(route).expect("unique route");
    Dispatcher::new(builder.build(), config)
}

/// Manifest used by the file-based tests: one good HTTP route, one good
/// RPC route and one route without a response type.
pub const MANIFEST_YAML: &str = r#"
routes:
  - sourcePath: api/users.ts
    exportName: getUser
    method: GET
    path: /users/{id}
    permission: users.read
    request:
      name: GetUserRequest
      comment: |
        /**
         * id::@params
         * token::@header(X-Api-Token)
         * ----
         */
      fields:
        - identifier: id
          type: { kind: primitive, name: number }
        - identifier: token
          type: { kind: primitive, name: string }
        - identifier: expand
          type: { kind: primitive, name: boolean }
          optional: true
    response:
      name: GetUserResponse
      fields:
        - identifier: name
          type: { kind: primitive, name: string }
  - sourcePath: rpc/users.ts
    exportName: rename
    method: rpc
    endpoint: users.rename
    auth: bearer
    request:
      name: RenameRequest
      fields:
        - identifier: id
          type: { kind: primitive, name: number }
        - identifier: name
          type: { kind: primitive, name: string }
    response:
      name: RenameResponse
      fields: []
  - sourcePath: api/broken.ts
    exportName: broken
    method: post
    path: /broken
    request:
      name: BrokenRequest
      fields: []
"#;
