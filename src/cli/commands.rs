use crate::logging::{init_logging, LogGuard};
use crate::runtime_config::RuntimeConfig;
use crate::spec::{compile_manifest, sources::pipes_of, BuildReport, ManifestVersion, RouteDescriptor};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

/// Command-line interface for routewitch
#[derive(Parser, Debug)]
#[command(name = "routewitch")]
#[command(about = "Compile and inspect route manifests", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Runtime config file (YAML, or TOML by extension) used for logging
    #[arg(long, global = true, env = "ROUTEWITCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a manifest and write the route descriptors as JSON
    Compile {
        /// Route manifest (YAML or JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print a per-route summary of field sources
    Inspect {
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Report build issues; exits 1 when any exist
    Check {
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

/// JSON artefact written by `compile`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledManifest<'a> {
    pub manifest_hash: &'a ManifestVersion,
    #[serde(flatten)]
    pub report: &'a BuildReport,
}

fn init_cli_logging(cli: &Cli) -> Result<LogGuard> {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::from_env(),
    };
    if cli.verbose {
        config.log.level = "debug".to_string();
    }
    init_logging(&config.log)
}

/// Parse-free entry point used by the binary and by tests.
pub fn run_cli(cli: Cli) -> Result<ExitCode> {
    let _guard = init_cli_logging(&cli)?;
    match &cli.command {
        Commands::Compile { manifest, out } => compile(manifest, out.as_deref()),
        Commands::Inspect { manifest } => {
            let (report, _) = compile_manifest(manifest)?;
            let stdout = io::stdout();
            write_inspect(&report, &mut stdout.lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { manifest } => {
            let (report, version) = compile_manifest(manifest)?;
            let stdout = io::stdout();
            let clean = write_check(&report, &version, &mut stdout.lock())?;
            Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}

fn compile(manifest: &Path, out: Option<&Path>) -> Result<ExitCode> {
    let (report, version) = compile_manifest(manifest)?;
    for issue in &report.issues {
        warn!(location = %issue.location, kind = %issue.kind, "{}", issue.message);
    }
    let artefact = CompiledManifest {
        manifest_hash: &version,
        report: &report,
    };
    let json = serde_json::to_string_pretty(&artefact).context("failed to serialize routes")?;
    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                output = %path.display(),
                routes = report.routes.len(),
                issues = report.issues.len(),
                "Compiled manifest written"
            );
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            writeln!(lock, "{json}")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn join_paths<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn write_route(route: &RouteDescriptor, out: &mut impl Write) -> io::Result<()> {
    let sources = &route.request.source_list;
    writeln!(
        out,
        "{} {}  [{}]",
        route.method, route.endpoint_or_path, route.uuid
    )?;
    writeln!(
        out,
        "  auth: {}  permission: {}  handler: {}",
        route.auth_id.as_deref().unwrap_or("(default)"),
        route.permission_tag.as_deref().unwrap_or("-"),
        route.handler_ref
    )?;
    writeln!(out, "  params:     {}", join_paths(&sources.params))?;
    writeln!(out, "  query:      {}", join_paths(&sources.query))?;
    writeln!(out, "  header:     {}", join_paths(&sources.header))?;
    writeln!(out, "  body:       {}", join_paths(&sources.body))?;
    writeln!(out, "  bestEffort: {}", join_paths(&sources.best_effort))?;
    for (path, pipes) in pipes_of(&route.request.annotations) {
        writeln!(out, "  pipe:       {path} {{{}}}", pipes.join(", "))?;
    }
    Ok(())
}

/// Human-readable route summary.
pub fn write_inspect(report: &BuildReport, out: &mut impl Write) -> io::Result<()> {
    for route in &report.routes {
        write_route(route, out)?;
    }
    if !report.issues.is_empty() {
        writeln!(out, "skipped {} route(s); run `check` for details", report.issues.len())?;
    }
    Ok(())
}

/// Print build issues. Returns `true` when there are none.
pub fn write_check(
    report: &BuildReport,
    version: &ManifestVersion,
    out: &mut impl Write,
) -> io::Result<bool> {
    for issue in &report.issues {
        writeln!(out, "{issue}")?;
    }
    if report.is_clean() {
        writeln!(
            out,
            "OK: {} route(s), manifest {version}",
            report.routes.len()
        )?;
    } else {
        writeln!(
            out,
            "{} issue(s), {} route(s) built",
            report.issues.len(),
            report.routes.len()
        )?;
    }
    Ok(report.is_clean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{build_routes, parse_manifest};

    const MANIFEST: &str = r#"
routes:
  - sourcePath: api/users.ts
    exportName: getUser
    method: get
    path: /users/{id}
    request:
      name: GetUserRequest
      comment: |
        /**
         * id::@params {trim}
         * token::@header(x-api-token)
         */
      fields:
        - identifier: id
          type: { kind: primitive, name: string }
        - identifier: token
          type: { kind: primitive, name: string }
        - identifier: verbose
          type: { kind: primitive, name: boolean }
          optional: true
    response:
      name: GetUserResponse
      fields: []
  - sourcePath: api/broken.ts
    exportName: broken
    method: post
    path: /broken
"#;

    fn report() -> BuildReport {
        let manifest = parse_manifest(MANIFEST, true).unwrap();
        build_routes(&manifest.routes)
    }

    #[test]
    fn inspect_lists_sources_per_route() {
        let mut out = Vec::new();
        write_inspect(&report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("GET /users/{id}  [api_users_ts_getUser]"));
        assert!(text.contains("params:     id"));
        assert!(text.contains("header:     token x-api-token"));
        assert!(text.contains("bestEffort: verbose"));
        assert!(text.contains("pipe:       id {trim}"));
        assert!(text.contains("skipped 1 route(s)"));
    }

    #[test]
    fn check_reports_issues() {
        let mut out = Vec::new();
        let clean = write_check(&report(), &ManifestVersion::default(), &mut out).unwrap();
        assert!(!clean);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[TypeNotDefined]"));
        assert!(text.contains("1 issue(s), 1 route(s) built"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["routewitch", "compile", "--manifest", "m.yaml", "-o", "out.json"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Compile { out: Some(_), .. }));
        assert!(Cli::try_parse_from(["routewitch", "frobnicate"]).is_err());
    }
}
