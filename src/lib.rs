//! # routewitch
//!
//! **routewitch** compiles declarative route definitions into validated,
//! transport-neutral endpoints and dispatches calls to them over HTTP or a
//! multiplexed RPC envelope.
//!
//! ## Overview
//!
//! A route is declared once, as a structural request type and a response
//! type plus a block comment of source annotations. An external source
//! parser hands those declarations over as a manifest. routewitch then:
//!
//! 1. flattens each type into a [`Schema`](spec::Schema) of dotted leaf
//!    paths ([`spec::schema`]),
//! 2. assigns every leaf to the transport it is read from: path params,
//!    query, header, body, or a method-specific best-effort guess
//!    ([`spec::sources`]),
//! 3. at runtime rebuilds the request object from the raw transport maps
//!    ([`assembler`]), validates it ([`validator`]) and invokes the bound
//!    handler ([`dispatcher`]).
//!
//! ## Architecture
//!
//! - **[`spec`]** - type descriptions, Schema Compiler, annotation grammar,
//!   Source-List Compiler, route build pass and manifest loading
//! - **[`validator`]** / **[`validator_cache`]** - JSON Schema validators
//!   compiled once per route
//! - **[`assembler`]** - raw transport maps to a nested request object
//! - **[`security`]** - auth handlers, permission checks, bearer tokens
//! - **[`registry`]** - two-phase builder producing a frozen registry
//! - **[`dispatcher`]** - the per-request state machine
//! - **[`rpc`]** - RPC request/response envelopes
//! - **[`typed`]** - serde-typed handlers
//! - **[`error`]** - error taxonomy and numeric application codes
//! - **[`runtime_config`]** / **[`logging`]** - configuration and tracing
//! - **[`cli`]** - the `routewitch` binary
//!
//! ### Build Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Parser as Source parser
//!     participant Build as spec::build_routes
//!     participant Schema as spec::schema
//!     participant Ann as spec::annotation
//!     participant Src as spec::sources
//!     participant Reg as RegistryBuilder
//!
//!     Parser->>Build: Manifest { routes }
//!     Build->>Schema: compile_schema("request", type)
//!     Schema-->>Build: Schema (flat leaf paths)
//!     Build->>Ann: parse_annotations(comment)
//!     Ann-->>Build: Vec<Annotation>
//!     Build->>Src: compile_source_list(schema, annotations)
//!     Src-->>Build: SourceList
//!     Build-->>Reg: RouteDescriptor (failing routes skipped)
//!     Reg->>Reg: bind handlers, precompile validators
//!     Reg-->>Reg: Arc<Registry> (frozen)
//! ```
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Adapter as Transport adapter
//!     participant D as Dispatcher
//!     participant Auth as AuthHandler
//!     participant Perm as PermissionCheck
//!     participant V as SchemaValidator
//!     participant H as RouteHandler
//!
//!     Client->>Adapter: HTTP request or RPC envelope
//!     Adapter->>D: dispatch_http / dispatch_rpc
//!     D->>Auth: authenticate(credential)
//!     alt rejected or no handler
//!         D-->>Client: 401 / RpcAuthNotAllowed
//!     end
//!     D->>Perm: check(context, permission tag)
//!     alt denied
//!         D-->>Client: 403 / PermissionCheckFailed
//!     end
//!     D->>D: assemble(raw, source list)
//!     D->>V: validate(candidate)
//!     alt invalid
//!         D-->>Client: 400 / RpcPacketMalformed
//!     end
//!     D->>H: call(HandlerRequest)
//!     H-->>D: HandlerResponse
//!     D-->>Client: HttpReply / RpcResponseEnvelope
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use routewitch::dispatcher::{handler_fn, Dispatcher, HandlerResponse};
//! use routewitch::registry::RegistryBuilder;
//! use routewitch::runtime_config::RuntimeConfig;
//! use routewitch::security::AnonymousAuth;
//! use routewitch::spec::{build_route, FieldDescription, ManifestVersion, RouteSource, TypeDescription};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let route = build_route(&RouteSource {
//!     source_path: "api/math.ts".into(),
//!     export_name: "add".into(),
//!     method: "rpc".into(),
//!     path: None,
//!     endpoint: Some("math.add".into()),
//!     auth: None,
//!     permission: None,
//!     handler: None,
//!     request: Some(TypeDescription {
//!         name: "AddRequest".into(),
//!         fields: vec![
//!             FieldDescription::primitive("a", "number"),
//!             FieldDescription::primitive("b", "number"),
//!         ],
//!         comment: None,
//!     }),
//!     response: Some(TypeDescription {
//!         name: "AddResponse".into(),
//!         fields: vec![FieldDescription::primitive("sum", "number")],
//!         comment: None,
//!     }),
//! })
//! .expect("route builds");
//!
//! let mut builder = RegistryBuilder::new(ManifestVersion::default());
//! builder.add_auth_handler("default", AnonymousAuth).unwrap();
//! builder.register_handler(
//!     &route.handler_ref,
//!     handler_fn(|req| async move {
//!         let a = req.request["a"].as_f64().unwrap_or(0.0);
//!         let b = req.request["b"].as_f64().unwrap_or(0.0);
//!         HandlerResponse::Ok(json!({ "sum": a + b }))
//!     }),
//! );
//! builder.register_route(route).unwrap();
//! let dispatcher = Dispatcher::new(builder.build(), RuntimeConfig::default());
//!
//! let reply = dispatcher
//!     .dispatch_rpc(&json!({
//!         "id": 7,
//!         "endpoint": "math.add",
//!         "authorization": "",
//!         "params": { "a": 1, "b": 2 }
//!     }))
//!     .await;
//! assert_eq!(reply.id, 7);
//! assert_eq!(reply.result, Some(json!({ "sum": 3.0 })));
//! # }
//! ```
//!
//! ## Annotations
//!
//! Field sources are declared in the request type's block comment, one
//! directive per line:
//!
//! ```text
//! /**
//!  * user.id::@params
//!  * filter::@query {trim, lower}
//!  * token::@header(x-api-token)
//!  * payload::@body
//!  */
//! ```
//!
//! Fields without a directive are resolved best-effort by method: GET and
//! DELETE try params then query, POST tries params then body, PATCH tries
//! params, query, then body. Annotated sources always win over best-effort
//! guesses.

pub mod assembler;
pub mod cli;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod logging;
pub mod registry;
pub mod rpc;
pub mod runtime_config;
pub mod security;
pub mod spec;
pub mod typed;
pub mod validator;
pub mod validator_cache;

pub use dispatcher::{Dispatcher, HandlerRequest, HandlerResponse, HttpReply, RouteHandler};
pub use error::{BuildError, CoreErrorCode, DispatchError, RegistryError};
pub use registry::{Registry, RegistryBuilder};
pub use rpc::{RpcRequestEnvelope, RpcResponseEnvelope};
pub use spec::{build_routes, compile_manifest, load_manifest, RouteDescriptor, RouteSource};
