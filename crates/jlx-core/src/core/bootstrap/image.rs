//! Compiled system images tagged with the julia version that built them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use jlx_domain::{
    canonical_image_name, declared_deps, existing_project_file, format_image_name,
    parse_image_name, shlib_suffix, BridgeKind, CompiledImage, ParsedImageName, ProjectConfig,
    WorkingProject, MANIFEST_FILES,
};

use crate::runtime::effects::{Effects, GuestSession};
use crate::tooling::errors::{BootstrapError, BootstrapResult};

fn scan(config: &ProjectConfig, dir: &Path) -> Vec<(PathBuf, ParsedImageName)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut images: Vec<_> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name();
            let parsed = parse_image_name(config.image_file_base(), name.to_str()?)?;
            Some((entry.path(), parsed))
        })
        .collect();
    images.sort_by(|left, right| left.0.cmp(&right.0));
    images
}

/// The image built by exactly `runtime_version`, preferring the platform
/// suffix.
pub(crate) fn find(
    config: &ProjectConfig,
    working: &WorkingProject,
    runtime_version: &str,
) -> Option<CompiledImage> {
    let matching: Vec<_> = scan(config, &working.image_dir(config))
        .into_iter()
        .filter(|(_, parsed)| parsed.version == runtime_version)
        .collect();
    let chosen = matching
        .iter()
        .find(|(_, parsed)| parsed.suffix == shlib_suffix())
        .or_else(|| matching.first())?;
    tracing::debug!(image = %chosen.0.display(), "compiled image found");
    Some(CompiledImage {
        path: chosen.0.clone(),
        builder_version: chosen.1.version.clone(),
        stale: false,
    })
}

/// Images left behind by other julia versions. They are never loaded.
pub(crate) fn stale(
    config: &ProjectConfig,
    working: &WorkingProject,
    runtime_version: &str,
) -> Vec<CompiledImage> {
    scan(config, &working.image_dir(config))
        .into_iter()
        .filter(|(_, parsed)| parsed.version != runtime_version)
        .map(|(path, parsed)| CompiledImage {
            path,
            builder_version: parsed.version,
            stale: true,
        })
        .collect()
}

fn remove_file(path: &Path, removed: &mut Vec<PathBuf>) -> BootstrapResult<()> {
    if path.is_file() {
        fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        tracing::info!(path = %path.display(), "removed");
        removed.push(path.to_path_buf());
    }
    Ok(())
}

fn remove_manifests(dir: &Path, removed: &mut Vec<PathBuf>) -> BootstrapResult<()> {
    for file in MANIFEST_FILES {
        remove_file(&dir.join(file), removed)?;
    }
    Ok(())
}

/// Resolves the image directory's own environment and runs the build script
/// in it. The script's artifact is renamed to carry `runtime_version` only
/// after the script succeeds.
pub(crate) fn compile(
    effects: &dyn Effects,
    config: &ProjectConfig,
    working: &WorkingProject,
    session: &GuestSession,
    runtime_version: &str,
) -> BootstrapResult<CompiledImage> {
    let dir = working.image_dir(config);
    let Some(project_file) = existing_project_file(&dir) else {
        return Err(BootstrapError::CompilationFailed {
            reason: format!("{} has no Project.toml", dir.display()),
        });
    };
    let script = dir.join(config.build_script());
    if !script.is_file() {
        return Err(BootstrapError::CompilationFailed {
            reason: format!("build script {} does not exist", script.display()),
        });
    }

    let session = session.with_project(&dir);
    remove_manifests(&dir, &mut Vec::new())?;
    sync_bridge_deps(effects, config, &session, &project_file)?;
    resolve_image_env(effects, &session, &dir)?;

    let canonical = dir.join(canonical_image_name());
    remove_file(&canonical, &mut Vec::new())?;
    tracing::info!(script = %script.display(), version = runtime_version, "compiling system image");
    let output = effects.guest().run_script(&session, &script, &dir)?;
    tracing::info!(code = output.code, "build script finished");
    if !output.success() {
        remove_file(&canonical, &mut Vec::new())?;
        return Err(BootstrapError::CompilationFailed {
            reason: output.failure_summary(),
        });
    }
    if !canonical.is_file() {
        return Err(BootstrapError::CompilationFailed {
            reason: format!("build script did not produce {}", canonical.display()),
        });
    }

    let target = dir.join(format_image_name(
        config.image_file_base(),
        runtime_version,
        shlib_suffix(),
    ));
    fs::rename(&canonical, &target).with_context(|| {
        format!("renaming {} to {}", canonical.display(), target.display())
    })?;
    tracing::info!(from = %canonical.display(), to = %target.display(), "system image tagged");
    Ok(CompiledImage {
        path: target,
        builder_version: runtime_version.to_string(),
        stale: false,
    })
}

/// The image environment depends on the active bridge package and not on
/// the other one.
fn sync_bridge_deps(
    effects: &dyn Effects,
    config: &ProjectConfig,
    session: &GuestSession,
    project_file: &Path,
) -> BootstrapResult<()> {
    let deps = declared_deps(project_file)?;
    let packages = effects.packages();
    for kind in [BridgeKind::PyCall, BridgeKind::PythonCall] {
        let package = kind.package_name();
        let declared = deps.iter().any(|dep| dep == package);
        let output = match (kind == config.bridge(), declared) {
            (true, false) => packages.add(session, package)?,
            (false, true) => packages.remove(session, package)?,
            _ => continue,
        };
        tracing::info!(package, added = !declared, code = output.code, "image bridge dependency synced");
        if !output.success() {
            return Err(BootstrapError::PackageResolutionFailed {
                context: project_file.display().to_string(),
                reason: output.failure_summary(),
            });
        }
    }
    Ok(())
}

fn resolve_image_env(effects: &dyn Effects, session: &GuestSession, dir: &Path) -> BootstrapResult<()> {
    let packages = effects.packages();
    let mut output = packages.resolve(session)?;
    if !output.success() {
        tracing::warn!(reason = %output.failure_summary(), "resolve failed, updating first");
        let updated = packages.update(session)?;
        tracing::info!(code = updated.code, "update finished");
        output = packages.resolve(session)?;
    }
    if output.success() {
        output = packages.instantiate(session, None)?;
    }
    if !output.success() {
        return Err(BootstrapError::PackageResolutionFailed {
            context: dir.display().to_string(),
            reason: output.failure_summary(),
        });
    }
    Ok(())
}

/// Deletes every managed image and the image directory's manifests.
pub(crate) fn clean(config: &ProjectConfig, working: &WorkingProject) -> BootstrapResult<Vec<PathBuf>> {
    let dir = working.image_dir(config);
    let mut removed = Vec::new();
    for (path, _) in scan(config, &dir) {
        remove_file(&path, &mut removed)?;
    }
    remove_file(&dir.join(canonical_image_name()), &mut removed)?;
    remove_manifests(&dir, &mut removed)?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::FakeEffects;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        fake: FakeEffects,
        config: ProjectConfig,
        working: WorkingProject,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let fake = FakeEffects::new(temp.path());
            let config = ProjectConfig::builder("mymod", temp.path().join("pkg"))
                .build()
                .unwrap();
            let working = WorkingProject::new(temp.path(), "mymod", "1.7.2");
            let dir = working.image_dir(&config);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("Project.toml"), "[deps]\n").unwrap();
            fs::write(dir.join(config.build_script()), "# build\n").unwrap();
            Self {
                temp,
                fake,
                config,
                working,
            }
        }

        fn dir(&self) -> PathBuf {
            self.working.image_dir(&self.config)
        }

        fn session(&self) -> GuestSession {
            GuestSession::new(
                PathBuf::from("julia"),
                self.working.root().to_path_buf(),
                Some(self.temp.path().join("depot")),
            )
        }

        fn place(&self, version: &str) -> PathBuf {
            let path = self
                .dir()
                .join(format_image_name("sys_mymod", version, shlib_suffix()));
            fs::write(&path, "image").unwrap();
            path
        }
    }

    #[test]
    fn find_requires_exact_version() {
        let fx = Fixture::new();
        fx.place("1.6.0");
        assert!(find(&fx.config, &fx.working, "1.7.2").is_none());
        let stale_images = stale(&fx.config, &fx.working, "1.7.2");
        assert_eq!(stale_images.len(), 1);
        assert!(stale_images[0].stale);

        let path = fx.place("1.7.2");
        let found = find(&fx.config, &fx.working, "1.7.2").unwrap();
        assert_eq!(found.path, path);
        assert!(find(&fx.config, &fx.working, "1.7.20").is_none());
    }

    #[test]
    fn other_bases_are_ignored() {
        let fx = Fixture::new();
        fs::write(fx.dir().join(format_image_name("sys_other", "1.7.2", shlib_suffix())), "").unwrap();
        assert!(find(&fx.config, &fx.working, "1.7.2").is_none());
        assert!(clean(&fx.config, &fx.working).unwrap().is_empty());
    }

    #[test]
    fn compile_tags_artifact_with_builder_version() {
        let fx = Fixture::new();
        fs::write(fx.dir().join("Manifest.toml"), "# old\n").unwrap();
        let image = compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap();
        assert_eq!(
            image.path,
            fx.dir().join(format_image_name("sys_mymod", "1.7.2", shlib_suffix()))
        );
        assert!(!fx.dir().join(canonical_image_name()).exists());
        assert_eq!(fx.fake.calls(), vec!["add PyCall", "resolve", "instantiate", "script"]);
        assert_eq!(find(&fx.config, &fx.working, "1.7.2").unwrap(), image);
    }

    #[test]
    fn resolve_failure_updates_then_retries() {
        let fx = Fixture::new();
        fx.fake.fail("resolve");
        let err = compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap_err();
        assert!(matches!(err, BootstrapError::PackageResolutionFailed { .. }));
        assert_eq!(fx.fake.calls(), vec!["add PyCall", "resolve", "update", "resolve"]);
    }

    #[test]
    fn image_env_tracks_active_bridge() {
        let fx = Fixture::new();
        fs::write(
            fx.dir().join("Project.toml"),
            "[deps]\nPyCall = \"438e738f-606a-5dbb-bf0a-cddfbfd45ab0\"\n",
        )
        .unwrap();
        compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap();
        assert_eq!(fx.fake.calls()[0], "resolve");

        let config = ProjectConfig::builder("mymod", fx.temp.path().join("pkg"))
            .bridge(BridgeKind::PythonCall)
            .build()
            .unwrap();
        let fake = FakeEffects::new(fx.temp.path());
        compile(&fake, &config, &fx.working, &fx.session(), "1.7.2").unwrap();
        assert_eq!(
            fake.calls()[..3],
            ["remove PyCall", "add PythonCall", "resolve"]
        );
    }

    #[test]
    fn failed_bridge_add_stops_before_resolving() {
        let fx = Fixture::new();
        fx.fake.fail("add");
        let err = compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap_err();
        assert!(matches!(err, BootstrapError::PackageResolutionFailed { .. }));
        assert_eq!(fx.fake.calls(), vec!["add PyCall"]);
    }

    #[test]
    fn failed_build_keeps_previous_image_and_removes_leftover() {
        let fx = Fixture::new();
        let previous = fx.place("1.7.2");
        fx.fake.fail("script");
        let err = compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap_err();
        assert!(matches!(err, BootstrapError::CompilationFailed { .. }));
        assert!(err.to_string().contains("build script failed"));
        assert!(previous.is_file());
        assert!(!fx.dir().join(canonical_image_name()).exists());
    }

    #[test]
    fn missing_build_script_fails_before_running() {
        let fx = Fixture::new();
        fs::remove_file(fx.dir().join(fx.config.build_script())).unwrap();
        let err = compile(&fx.fake, &fx.config, &fx.working, &fx.session(), "1.7.2").unwrap_err();
        assert!(matches!(err, BootstrapError::CompilationFailed { .. }));
        assert_eq!(fx.fake.invocations(), 0);
    }

    #[test]
    fn clean_removes_managed_images_and_manifests() {
        let fx = Fixture::new();
        let old = fx.place("1.6.0");
        let current = fx.place("1.7.2");
        fs::write(fx.dir().join("Manifest.toml"), "").unwrap();
        let removed = clean(&fx.config, &fx.working).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(!old.exists() && !current.exists());
        assert!(fx.dir().join("Project.toml").is_file());
        assert!(fx.dir().join(fx.config.build_script()).is_file());
    }
}
