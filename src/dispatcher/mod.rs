//! # Dispatcher Module
//!
//! The Dispatch Engine shared by the HTTP and RPC transports.
//!
//! ## Request flow
//!
//! Every call moves through the same stages:
//!
//! ```text
//! Received -> Authenticating -> PermissionChecking -> Assembling
//!          -> Validating -> Invoking -> Responded
//! ```
//!
//! Any stage may end in `Rejected`. Authentication always runs before
//! validation, so a request with a bad credential never reaches the
//! validator or the handler.
//!
//! 1. **Authenticating**: the route's auth id (or the configured default)
//!    is resolved in the registry. A missing handler rejects the call.
//! 2. **PermissionChecking**: the optional global [`PermissionCheck`]
//!    sees the auth context and the route's permission tag.
//! 3. **Assembling**: the request object is rebuilt from the raw transport
//!    maps (see [`crate::assembler`]).
//! 4. **Validating**: the precompiled request validator checks the object
//!    and prunes undeclared keys.
//! 5. **Invoking**: the route handler runs on its own tokio task, so a
//!    panicking handler becomes an internal error instead of tearing down
//!    the caller.
//!
//! The whole chain runs under the configured deadline; expiry aborts the
//! handler task and yields `DeadlineExceeded`.
//!
//! ## Transports
//!
//! - [`Dispatcher::dispatch_http`] / [`Dispatcher::dispatch_http_path`]
//!   return an [`HttpReply`] (status, JSON body, optional `Location`).
//! - [`Dispatcher::dispatch_rpc`] takes a raw envelope and always returns
//!   an [`RpcResponseEnvelope`](crate::rpc::RpcResponseEnvelope).
//!
//! ## Handlers
//!
//! ```rust
//! use routewitch::dispatcher::{handler_fn, HandlerResponse};
//!
//! let greet = handler_fn(|req| async move {
//!     let name = req.request["name"].as_str().unwrap_or("world").to_string();
//!     HandlerResponse::Ok(serde_json::json!({ "greeting": format!("hello {name}") }))
//! });
//! # let _ = greet;
//! ```
//!
//! [`PermissionCheck`]: crate::security::PermissionCheck

mod core;
mod handler;

pub use core::{DispatchStage, Dispatcher, HttpReply};
pub use handler::{handler_fn, FnHandler, HandlerRequest, HandlerResponse, RouteHandler};
