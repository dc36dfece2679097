use super::build::{build_routes, BuildReport, RouteSource};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Route manifest produced by the external source parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub routes: Vec<RouteSource>,
}

/// Content hash of a manifest (first 16 hex chars of SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub hash: String,
}

impl ManifestVersion {
    pub fn from_content(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let hash = digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect();
        Self { hash }
    }
}

impl Default for ManifestVersion {
    fn default() -> Self {
        Self {
            hash: "initial".to_string(),
        }
    }
}

impl std::fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hash)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Parse manifest text; YAML when `yaml` is set, JSON otherwise.
pub fn parse_manifest(content: &str, yaml: bool) -> anyhow::Result<Manifest> {
    let manifest = if yaml {
        serde_yaml::from_str(content).context("manifest is not valid YAML")?
    } else {
        serde_json::from_str(content).context("manifest is not valid JSON")?
    };
    Ok(manifest)
}

/// Read a manifest from disk.
pub fn load_manifest(file_path: impl AsRef<Path>) -> anyhow::Result<(Manifest, ManifestVersion)> {
    let path = file_path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest = parse_manifest(&content, is_yaml(path))
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    Ok((manifest, ManifestVersion::from_content(content.as_bytes())))
}

/// Read a manifest and build every route in it.
pub fn compile_manifest(
    file_path: impl AsRef<Path>,
) -> anyhow::Result<(BuildReport, ManifestVersion)> {
    let (manifest, version) = load_manifest(file_path)?;
    Ok((build_routes(&manifest.routes), version))
}
