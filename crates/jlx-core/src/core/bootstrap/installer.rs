//! Registry installation and manifest instantiation for a working project.

use std::path::{Path, PathBuf};

use anyhow::Context;
use filetime::FileTime;
use jlx_domain::{existing_manifest, needs_resolve, registry_present, ProjectConfig};

use super::store::DependencyStore;
use crate::runtime::effects::{GuestSession, PackageManager};
use crate::runtime::process::RunOutput;
use crate::tooling::errors::{BootstrapError, BootstrapResult};

const GENERAL: &str = "General";

fn resolution_failed(context: impl Into<String>, output: &RunOutput) -> BootstrapError {
    BootstrapError::PackageResolutionFailed {
        context: context.into(),
        reason: output.failure_summary(),
    }
}

fn manifest_label(project_dir: &Path) -> String {
    existing_manifest(project_dir)
        .unwrap_or_else(|| project_dir.join("Manifest.toml"))
        .display()
        .to_string()
}

fn modified(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Makes sure the registries are present and the manifest is instantiated.
/// Returns whether any resolution work ran.
pub(crate) fn ensure_ready(
    packages: &dyn PackageManager,
    config: &ProjectConfig,
    session: &GuestSession,
    store: &DependencyStore,
    force: bool,
) -> BootstrapResult<bool> {
    let project_dir = &session.project;
    let depot = store.path();
    if !force && depot.is_some_and(|depot| !needs_resolve(project_dir, depot)) {
        tracing::info!(project = %project_dir.display(), "packages up to date, skipping resolution");
        return Ok(false);
    }

    add_registry(packages, session, depot, GENERAL, None)?;
    for (name, url) in config.registries() {
        add_registry(packages, session, depot, name, Some(url))?;
    }

    let before = existing_manifest(project_dir).and_then(|path| modified(&path));
    tracing::info!(project = %project_dir.display(), "instantiating packages");
    let output = packages.instantiate(session, config.pre_instantiate())?;
    tracing::info!(code = output.code, "instantiate finished");
    if !output.success() {
        return Err(resolution_failed(manifest_label(project_dir), &output));
    }
    let Some(manifest) = existing_manifest(project_dir) else {
        return Err(BootstrapError::PackageResolutionFailed {
            context: project_dir.display().to_string(),
            reason: "instantiate finished without writing a manifest".into(),
        });
    };
    if before.is_some() && before == modified(&manifest) {
        touch(&manifest)?;
    }
    Ok(true)
}

fn add_registry(
    packages: &dyn PackageManager,
    session: &GuestSession,
    depot: Option<&Path>,
    name: &str,
    url: Option<&str>,
) -> BootstrapResult<()> {
    if depot.is_some_and(|depot| registry_present(depot, name)) {
        tracing::debug!(registry = name, "registry already present");
        return Ok(());
    }
    tracing::info!(registry = name, url = url.unwrap_or("default"), "adding registry");
    let output = packages.add_registry(session, name, url)?;
    tracing::info!(registry = name, code = output.code, "registry add finished");
    if !output.success() {
        return Err(resolution_failed(format!("registry {name}"), &output));
    }
    if let Some(depot) = depot {
        if !registry_present(depot, name) {
            return Err(BootstrapError::PackageResolutionFailed {
                context: format!("registry {name}"),
                reason: format!("not present in {} after adding", depot.display()),
            });
        }
    }
    Ok(())
}

fn touch(path: &Path) -> BootstrapResult<()> {
    filetime::set_file_mtime(path, FileTime::now())
        .with_context(|| format!("touching {}", path.display()))?;
    tracing::debug!(path = %path.display(), "manifest touched");
    Ok(())
}

/// `Pkg.update` followed by resolve and instantiate.
pub(crate) fn update(packages: &dyn PackageManager, session: &GuestSession) -> BootstrapResult<PathBuf> {
    tracing::info!(project = %session.project.display(), "updating packages");
    let output = packages.update(session)?;
    tracing::info!(code = output.code, "update finished");
    if !output.success() {
        return Err(resolution_failed(manifest_label(&session.project), &output));
    }
    Ok(session.project.clone())
}
