//! Chooses between the shared depot and a private one per working project.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use jlx_domain::{parse_yes_no, shared_depot, ProjectConfig, StoreMode, WorkingProject};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::EnvSnapshot;
use crate::tooling::errors::{BootstrapError, BootstrapResult};

pub(crate) const OWNER_FILE: &str = ".jlx-owner";
/// Records a prompted "shared" answer in the working project.
pub(crate) const CHOICE_FILE: &str = ".jlx-depot";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DependencyStore {
    /// The user's depot; `path` is `None` when it cannot be determined.
    Shared { path: Option<PathBuf> },
    Private { path: PathBuf },
}

impl DependencyStore {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Shared { path } => path.as_deref(),
            Self::Private { path } => Some(path),
        }
    }

    /// Depot to export to guest subprocesses; the shared one is inherited.
    #[must_use]
    pub fn session_depot(&self) -> Option<PathBuf> {
        match self {
            Self::Shared { .. } => None,
            Self::Private { path } => Some(path.clone()),
        }
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private { .. })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OwnerMarker {
    project: String,
    created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceMarker {
    store: String,
    chosen_at: String,
}

/// Picks the store for `working`. `conflict` is set once the bridge has
/// reported a host mismatch on the shared store; `ask` is the prompt.
pub(crate) fn resolve_store(
    config: &ProjectConfig,
    env: &EnvSnapshot,
    working: &WorkingProject,
    conflict: bool,
    ask: impl FnOnce() -> BootstrapResult<bool>,
) -> BootstrapResult<DependencyStore> {
    let private = working.private_depot();
    let (use_private, origin) = match config.store_mode() {
        StoreMode::Shared => (false, "configuration"),
        StoreMode::Private => (true, "configuration"),
        StoreMode::Ask => {
            let name = config.env().depot();
            if let Some(value) = env.var(&name) {
                (parse_yes_no(&name, value)?, "environment")
            } else if owned_by(&private, config.name()) {
                (true, "existing private depot")
            } else if conflict {
                (true, "shared depot conflict")
            } else if shared_recorded(working) {
                (false, "recorded choice")
            } else if config.bridge().can_conflict() {
                let answer = ask()?;
                if !answer {
                    record_shared(working)?;
                }
                (answer, "prompt")
            } else {
                (false, "default")
            }
        }
    };
    let store = if use_private {
        ensure_private(&private, config.name())?;
        DependencyStore::Private { path: private }
    } else {
        DependencyStore::Shared {
            path: shared_depot(env.lookup()),
        }
    };
    tracing::info!(store = ?store, origin, "depot selected");
    Ok(store)
}

fn now_rfc3339() -> BootstrapResult<String> {
    Ok(OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting timestamp")?)
}

fn shared_recorded(working: &WorkingProject) -> bool {
    fs::read_to_string(working.root().join(CHOICE_FILE))
        .ok()
        .and_then(|raw| serde_json::from_str::<ChoiceMarker>(&raw).ok())
        .is_some_and(|choice| choice.store == "shared")
}

fn record_shared(working: &WorkingProject) -> BootstrapResult<()> {
    let root = working.root();
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let choice = ChoiceMarker {
        store: "shared".to_string(),
        chosen_at: now_rfc3339()?,
    };
    let contents = serde_json::to_string_pretty(&choice).context("encoding depot choice")?;
    let path = root.join(CHOICE_FILE);
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "shared depot choice recorded");
    Ok(())
}

fn read_owner(depot: &Path) -> Option<OwnerMarker> {
    let raw = fs::read_to_string(depot.join(OWNER_FILE)).ok()?;
    serde_json::from_str(&raw).ok()
}

fn owned_by(depot: &Path, project: &str) -> bool {
    read_owner(depot).is_some_and(|owner| owner.project == project)
}

/// Creates or reuses a private depot. A directory without a marker is
/// adopted; one marked for another project is refused.
pub(crate) fn ensure_private(depot: &Path, project: &str) -> BootstrapResult<()> {
    if let Some(owner) = read_owner(depot) {
        if owner.project == project {
            return Ok(());
        }
        return Err(BootstrapError::configuration(format!(
            "private depot {} belongs to project `{}`",
            depot.display(),
            owner.project
        )));
    }
    fs::create_dir_all(depot)
        .with_context(|| format!("creating private depot {}", depot.display()))?;
    let marker = OwnerMarker {
        project: project.to_string(),
        created_at: now_rfc3339()?,
    };
    let contents = serde_json::to_string_pretty(&marker).context("encoding depot owner")?;
    fs::write(depot.join(OWNER_FILE), contents)
        .with_context(|| format!("writing owner marker in {}", depot.display()))?;
    tracing::info!(depot = %depot.display(), project, "private depot created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jlx_domain::BridgeKind;
    use tempfile::TempDir;

    fn config(mode: StoreMode, bridge: BridgeKind) -> ProjectConfig {
        ProjectConfig::builder("mymod", "/pkg")
            .env_prefix("MYMOD_")
            .store_mode(mode)
            .bridge(bridge)
            .build()
            .unwrap()
    }

    fn never() -> BootstrapResult<bool> {
        panic!("prompt must not be shown")
    }

    #[test]
    fn explicit_mode_beats_environment() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        let env = EnvSnapshot::from_pairs(&[("MYMOD_DEPOT", "y"), ("JULIA_DEPOT_PATH", "/depot")]);
        let store = resolve_store(
            &config(StoreMode::Shared, BridgeKind::PyCall),
            &env,
            &working,
            true,
            never,
        )
        .unwrap();
        assert_eq!(
            store,
            DependencyStore::Shared {
                path: Some(PathBuf::from("/depot"))
            }
        );
    }

    #[test]
    fn environment_override_creates_private_depot() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        let env = EnvSnapshot::from_pairs(&[("MYMOD_DEPOT", "y")]);
        let store = resolve_store(&config(StoreMode::Ask, BridgeKind::PyCall), &env, &working, false, never)
            .unwrap();
        assert!(store.is_private());
        assert!(owned_by(&working.private_depot(), "mymod"));
    }

    #[test]
    fn existing_private_depot_is_reused_without_prompt() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        ensure_private(&working.private_depot(), "mymod").unwrap();
        let store = resolve_store(
            &config(StoreMode::Ask, BridgeKind::PyCall),
            &EnvSnapshot::default(),
            &working,
            false,
            never,
        )
        .unwrap();
        assert!(store.is_private());
    }

    #[test]
    fn conflict_switches_to_private() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        let store = resolve_store(
            &config(StoreMode::Ask, BridgeKind::PyCall),
            &EnvSnapshot::default(),
            &working,
            true,
            never,
        )
        .unwrap();
        assert!(store.is_private());
    }

    #[test]
    fn prompt_only_for_conflicting_bridges() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        let env = EnvSnapshot::from_pairs(&[("JULIA_DEPOT_PATH", "/depot")]);
        let store = resolve_store(
            &config(StoreMode::Ask, BridgeKind::PythonCall),
            &env,
            &working,
            false,
            never,
        )
        .unwrap();
        assert!(!store.is_private());

        let store = resolve_store(
            &config(StoreMode::Ask, BridgeKind::PyCall),
            &env,
            &working,
            false,
            || Ok(true),
        )
        .unwrap();
        assert!(store.is_private());
    }

    #[test]
    fn declined_prompt_is_remembered_for_the_working_project() {
        let temp = TempDir::new().unwrap();
        let working = WorkingProject::new(temp.path(), "mymod", "1.9.4");
        let config = config(StoreMode::Ask, BridgeKind::PyCall);
        let env = EnvSnapshot::default();
        let store = resolve_store(&config, &env, &working, false, || Ok(false)).unwrap();
        assert!(!store.is_private());
        assert!(working.root().join(CHOICE_FILE).is_file());

        let store = resolve_store(&config, &env, &working, false, never).unwrap();
        assert!(!store.is_private());

        let store = resolve_store(&config, &env, &working, true, never).unwrap();
        assert!(store.is_private());
    }

    #[test]
    fn foreign_private_depot_is_refused() {
        let temp = TempDir::new().unwrap();
        let depot = temp.path().join("depot");
        ensure_private(&depot, "other").unwrap();
        let err = ensure_private(&depot, "mymod").unwrap_err();
        assert!(err.to_string().contains("belongs to project `other`"));
        ensure_private(&depot, "other").unwrap();
    }

    #[test]
    fn unmarked_directory_is_adopted() {
        let temp = TempDir::new().unwrap();
        let depot = temp.path().join("depot");
        fs::create_dir_all(depot.join("packages")).unwrap();
        ensure_private(&depot, "mymod").unwrap();
        assert!(depot.join("packages").is_dir());
        assert!(owned_by(&depot, "mymod"));
    }
}
