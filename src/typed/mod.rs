//! # Typed Handlers
//!
//! Route handlers written against serde types. The dispatcher hands every
//! handler the validated request as JSON; [`Typed`] deserializes it into
//! the handler's `Request` type and serializes its `Response` back.
//!
//! ```rust
//! use async_trait::async_trait;
//! use routewitch::dispatcher::HandlerResponse;
//! use routewitch::typed::{TypedHandler, TypedHandlerRequest};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct GetUser {
//!     id: i64,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! struct GetUserHandler;
//!
//! #[async_trait]
//! impl TypedHandler for GetUserHandler {
//!     type Request = GetUser;
//!     type Response = User;
//!
//!     async fn handle(&self, req: TypedHandlerRequest<GetUser>) -> Result<User, HandlerResponse> {
//!         if req.data.id == 0 {
//!             return Err(req.error(404, "no such user"));
//!         }
//!         Ok(User { id: req.data.id, name: "Ada".into() })
//!     }
//! }
//! ```
//!
//! A request that passes schema validation can still fail conversion when
//! the Rust type is stricter than the declared shape. HTTP routes then
//! answer 400 with a `ValidationFailed` body; RPC routes answer with
//! `RpcPacketMalformed`.

mod core;

pub use core::*;
