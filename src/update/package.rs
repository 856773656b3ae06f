use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::version::{parse_version, Version};
use crate::config::PackageConfig;
use crate::host::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Flat installer package, applied by the platform installer
    Pkg,
    TarGz,
    Zip,
}

impl ArtifactKind {
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".pkg") {
            Ok(Self::Pkg)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(anyhow!("Unknown artifact format: {:?}", path))
        }
    }
}

/// A downloaded artifact together with its expanded tree
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub expanded: PathBuf,
}

/// Expand the artifact at `path` into `dest`
pub fn expand(path: &Path, dest: &Path, host: &dyn Host) -> Result<Artifact> {
    let kind = ArtifactKind::detect(path)?;

    match kind {
        // pkgutil insists on creating the destination itself
        ArtifactKind::Pkg => host
            .expand_package(path, dest)
            .with_context(|| format!("Failed to expand {}", path.display()))?,
        ArtifactKind::TarGz => extract_tar_gz(path, dest)?,
        ArtifactKind::Zip => extract_zip(path, dest)?,
    }

    Ok(Artifact {
        path: path.to_path_buf(),
        kind,
        expanded: dest.to_path_buf(),
    })
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::io::BufReader;

    fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path).context("Failed to open archive")?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);

    archive.unpack(dest_dir).context("Failed to extract tar.gz")
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path).context("Failed to open archive")?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;

    archive.extract(dest_dir).context("Failed to extract zip")
}

/// Shallowest entry under `root` named `name` that satisfies `accept`
fn find_named(root: &Path, name: &str, accept: impl Fn(&walkdir::DirEntry) -> bool) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == name && accept(e))
        .min_by_key(|e| e.depth())
        .map(|e| e.into_path())
}

/// Locate the descriptor file in the expanded package
pub fn find_descriptor(root: &Path, name: &str) -> Result<PathBuf> {
    find_named(root, name, |e| e.file_type().is_file())
        .ok_or_else(|| anyhow!("Descriptor '{}' not found in {}", name, root.display()))
}

/// Locate an application bundle directory in an expanded archive
pub fn find_bundle(root: &Path, bundle_name: &str) -> Result<PathBuf> {
    find_named(root, bundle_name, |e| e.file_type().is_dir())
        .ok_or_else(|| anyhow!("Bundle '{}' not found in {}", bundle_name, root.display()))
}

/// Pull the version out of descriptor text: capture group 1 when the pattern
/// has one, the whole match otherwise.
pub fn extract_version(text: &str, pattern: &Regex) -> Result<Version> {
    let caps = pattern
        .captures(text)
        .ok_or_else(|| anyhow!("No version matching '{}' in descriptor", pattern.as_str()))?;

    let matched = caps
        .get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
        .unwrap_or_default();

    parse_version(matched)
}

/// Version the expanded artifact would install
pub fn discover_version(artifact: &Artifact, config: &PackageConfig) -> Result<Version> {
    let descriptor = find_descriptor(&artifact.expanded, &config.descriptor)?;
    let text = fs::read_to_string(&descriptor)
        .with_context(|| format!("Failed to read {}", descriptor.display()))?;

    extract_version(&text, &config.version_regex()?)
        .with_context(|| format!("In {}", descriptor.display()))
}
