//! # CLI Module
//!
//! The `routewitch` binary compiles route manifests produced by an external
//! source parser and reports on them.
//!
//! ## Commands
//!
//! ### `compile`
//!
//! Build every route in the manifest and write the compiled descriptors
//! (schema, annotations, source list per root) as JSON:
//!
//! ```bash
//! routewitch compile --manifest routes.yaml --out routes.json
//! ```
//!
//! Routes that fail to build are logged and left out. The command only
//! fails when the manifest itself cannot be read or parsed.
//!
//! ### `inspect`
//!
//! Print, per route, which transport each request field is read from:
//!
//! ```bash
//! routewitch inspect --manifest routes.yaml
//! ```
//!
//! ### `check`
//!
//! Print build issues and exit with status 1 when there are any:
//!
//! ```bash
//! routewitch check --manifest routes.yaml
//! ```
//!
//! ## Global options
//!
//! - `--config <FILE>`: runtime config whose `log` section configures logging
//! - `-v, --verbose`: debug-level logging

mod commands;

pub use commands::{run_cli, write_check, write_inspect, Cli, Commands, CompiledManifest};
