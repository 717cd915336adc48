//! Drives locate, provision, validate, install and image loading for one
//! project, once per process.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context};
use jlx_domain::{
    resolve_data_root, update_copy, CompiledImage, LifecycleState, PostInitHook, ProjectConfig,
    RuntimeCandidate, WorkingProject, MANIFEST_FILES,
};
use serde::Serialize;

use super::questions::{Prompt, QuestionKey, Questions};
use super::store::{resolve_store, DependencyStore};
use super::{image, installer};
use crate::config::EnvSnapshot;
use crate::runtime::effects::{
    BridgeStatus, BuildReason, GuestSession, HostBinding, SharedEffects,
};
use crate::runtime::locator;
use crate::runtime::process::run_command;
use crate::tooling::errors::{BootstrapError, BootstrapResult};

/// What a host needs to start julia once initialization is done.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadyReport {
    pub runtime: RuntimeCandidate,
    pub project_dir: PathBuf,
    pub store: DependencyStore,
    /// Image to load, absent when none matches or images are disabled.
    pub image: Option<CompiledImage>,
    pub stale_images: Vec<CompiledImage>,
}

impl ReadyReport {
    fn session(&self) -> GuestSession {
        GuestSession::new(
            self.runtime.path.clone(),
            self.project_dir.clone(),
            self.store.session_depot(),
        )
    }

    /// Variables a julia child process must see.
    #[must_use]
    pub fn launch_env(&self) -> Vec<(String, String)> {
        self.session().envs()
    }

    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![format!("--project={}", self.project_dir.display())];
        if let Some(image) = &self.image {
            args.push(format!("--sysimage={}", image.path.display()));
        }
        args
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitStatus {
    Ready(ReadyReport),
    Disabled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
}

struct Inner {
    config: ProjectConfig,
    state: LifecycleState,
    questions: Questions,
    runtime: Option<RuntimeCandidate>,
    working: Option<WorkingProject>,
    ready: Option<ReadyReport>,
    store_conflict: bool,
}

/// Bootstrap controller for one host package. Operations are serialized by
/// an internal lock.
pub struct Lifecycle {
    effects: SharedEffects,
    prompt: Arc<dyn Prompt>,
    env: EnvSnapshot,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(config: ProjectConfig, effects: SharedEffects, prompt: Arc<dyn Prompt>) -> Self {
        Self::with_env(config, effects, prompt, EnvSnapshot::capture())
    }

    #[must_use]
    pub fn with_env(
        config: ProjectConfig,
        effects: SharedEffects,
        prompt: Arc<dyn Prompt>,
        env: EnvSnapshot,
    ) -> Self {
        let state = if config.enabled() {
            LifecycleState::Uninitialized
        } else {
            LifecycleState::Disabled
        };
        Self {
            effects,
            prompt,
            env,
            inner: Mutex::new(Inner {
                config,
                state,
                questions: Questions::default(),
                runtime: None,
                working: None,
                ready: None,
                store_conflict: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    #[must_use]
    pub fn config(&self) -> ProjectConfig {
        self.lock().config.clone()
    }

    /// Brings the runtime to Ready, then compiles an image when asked to.
    ///
    /// # Errors
    /// Any bootstrap failure. A failed image compilation after Ready is
    /// returned as [`BootstrapError::CompilationFailed`] while the state
    /// stays Ready.
    pub fn ensure_init(&self) -> BootstrapResult<InitStatus> {
        let mut inner = self.lock();
        self.init_locked(&mut inner, true)
    }

    /// Finds the runtime without initializing anything else.
    ///
    /// # Errors
    /// Locator failures.
    pub fn locate(&self) -> BootstrapResult<RuntimeCandidate> {
        let mut inner = self.lock();
        self.runtime_locked(&mut inner)
    }

    /// Compiles a system image for the located runtime.
    ///
    /// # Errors
    /// [`BootstrapError::Disabled`] when initialization is disabled, init
    /// failures, or the compilation failure.
    pub fn compile(&self) -> BootstrapResult<CompiledImage> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let report = self.require_ready(inner)?;
        let working = self.working_locked(inner, &report.runtime)?;
        let compiled = image::compile(
            self.effects.as_ref(),
            &inner.config,
            &working,
            &report.session(),
            &report.runtime.version,
        )?;
        if let Some(ready) = inner.ready.as_mut() {
            if inner.config.use_image() {
                ready.image = Some(compiled.clone());
            }
            ready.stale_images = image::stale(&inner.config, &working, &ready.runtime.version);
        }
        Ok(compiled)
    }

    /// Re-resolves the working project's packages.
    ///
    /// # Errors
    /// [`BootstrapError::Disabled`], init failures, or resolution failures.
    pub fn update(&self) -> BootstrapResult<PathBuf> {
        let mut inner = self.lock();
        let report = self.require_ready(&mut inner)?;
        installer::update(self.effects.packages(), &report.session())
    }

    /// Removes compiled images and resolution caches of every working
    /// project. The located runtime and prompt answers are kept.
    ///
    /// # Errors
    /// I/O failures while deleting.
    pub fn clean(&self) -> BootstrapResult<CleanReport> {
        let mut inner = self.lock();
        let data_root = resolve_data_root(&inner.config, self.env.lookup())?;
        let mut removed = Vec::new();
        for root in WorkingProject::list_all(&data_root, inner.config.name()) {
            let working = WorkingProject::at(root);
            removed.extend(image::clean(&inner.config, &working)?);
            for manifest in working.manifest_files() {
                if manifest.is_file() {
                    fs::remove_file(&manifest)
                        .with_context(|| format!("removing {}", manifest.display()))?;
                    tracing::info!(path = %manifest.display(), "removed");
                    removed.push(manifest);
                }
            }
        }
        inner.ready = None;
        inner.working = None;
        reset_state(&mut inner);
        Ok(CleanReport { removed })
    }

    /// Removes every working project, private depots included, and forgets
    /// all cached decisions.
    ///
    /// # Errors
    /// I/O failures while deleting.
    pub fn clean_all(&self) -> BootstrapResult<CleanReport> {
        let mut inner = self.lock();
        let data_root = resolve_data_root(&inner.config, self.env.lookup())?;
        let mut removed = Vec::new();
        for root in WorkingProject::list_all(&data_root, inner.config.name()) {
            fs::remove_dir_all(&root).with_context(|| format!("removing {}", root.display()))?;
            tracing::info!(path = %root.display(), "removed working project");
            removed.push(root);
        }
        inner.ready = None;
        inner.working = None;
        inner.runtime = None;
        inner.store_conflict = false;
        inner.questions.reset();
        reset_state(&mut inner);
        Ok(CleanReport { removed })
    }

    /// Returns whether initialization was already disabled.
    pub fn disable_init(&self) -> bool {
        let mut inner = self.lock();
        let previous = !inner.config.enabled();
        inner.config.set_enabled(false);
        inner.state = LifecycleState::Disabled;
        tracing::info!(project = inner.config.name(), "initialization disabled");
        previous
    }

    /// Returns whether initialization was disabled before the call.
    pub fn enable_init(&self) -> bool {
        let mut inner = self.lock();
        let previous = !inner.config.enabled();
        inner.config.set_enabled(true);
        inner.state = LifecycleState::Uninitialized;
        inner.ready = None;
        tracing::info!(project = inner.config.name(), "initialization enabled");
        previous
    }

    fn require_ready(&self, inner: &mut Inner) -> BootstrapResult<ReadyReport> {
        match self.init_locked(inner, false)? {
            InitStatus::Ready(report) => Ok(report),
            InitStatus::Disabled => Err(BootstrapError::Disabled),
        }
    }

    fn init_locked(&self, inner: &mut Inner, auto_compile: bool) -> BootstrapResult<InitStatus> {
        if !inner.config.enabled() {
            inner.state = LifecycleState::Disabled;
            tracing::debug!("initialization disabled, nothing to do");
            return Ok(InitStatus::Disabled);
        }
        if inner.state == LifecycleState::Ready {
            if let Some(report) = &inner.ready {
                return Ok(InitStatus::Ready(report.clone()));
            }
        }
        let (report, resolved) = match self.bootstrap(inner) {
            Ok(done) => done,
            Err(err) => {
                inner.state = match err {
                    BootstrapError::ConstraintUnsatisfied { .. } => LifecycleState::ConstraintFailed,
                    _ => LifecycleState::Failed,
                };
                tracing::error!(state = %inner.state, error = %err, "initialization failed");
                return Err(err);
            }
        };

        if let Err(err) = run_hook(inner.config.post_init(), &report, inner.config.package_root()) {
            inner.state = LifecycleState::Failed;
            tracing::error!(error = %err, "post-init hook failed");
            return Err(err);
        }
        inner.state = LifecycleState::Ready;
        inner.ready = Some(report.clone());
        tracing::info!(
            runtime = %report.runtime.path.display(),
            version = %report.runtime.version,
            project = %report.project_dir.display(),
            image = ?report.image.as_ref().map(|image| image.path.display().to_string()),
            "julia ready"
        );

        if auto_compile && inner.config.use_image() && report.image.is_none() {
            let wanted = if resolved {
                inner
                    .questions
                    .ask(QuestionKey::Compile, &inner.config, &self.env, self.prompt.as_ref())?
            } else {
                inner
                    .questions
                    .preset(QuestionKey::Compile, &inner.config, &self.env)?
                    .unwrap_or(false)
            };
            if wanted {
                let working = self.working_locked(inner, &report.runtime)?;
                let compiled = image::compile(
                    self.effects.as_ref(),
                    &inner.config,
                    &working,
                    &report.session(),
                    &report.runtime.version,
                )?;
                if let Some(ready) = inner.ready.as_mut() {
                    ready.image = Some(compiled);
                    return Ok(InitStatus::Ready(ready.clone()));
                }
            }
        }
        Ok(InitStatus::Ready(report))
    }

    fn runtime_locked(&self, inner: &mut Inner) -> BootstrapResult<RuntimeCandidate> {
        if let Some(runtime) = &inner.runtime {
            tracing::debug!(path = %runtime.path.display(), "reusing located julia");
            return Ok(runtime.clone());
        }
        let prompt = self.prompt.as_ref();
        let questions = &mut inner.questions;
        let config = &inner.config;
        let runtime = locator::locate(config, &self.env, self.effects.as_ref(), || {
            questions.ask(QuestionKey::InstallRuntime, config, &self.env, prompt)
        })?;
        inner.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    fn working_locked(
        &self,
        inner: &mut Inner,
        runtime: &RuntimeCandidate,
    ) -> BootstrapResult<WorkingProject> {
        if let Some(working) = &inner.working {
            return Ok(working.clone());
        }
        let data_root = resolve_data_root(&inner.config, self.env.lookup())?;
        let working = WorkingProject::new(&data_root, inner.config.name(), &runtime.version);
        inner.working = Some(working.clone());
        Ok(working)
    }

    /// Everything up to Ready except the hook. Also reports whether package
    /// resolution ran.
    fn bootstrap(&self, inner: &mut Inner) -> BootstrapResult<(ReadyReport, bool)> {
        inner.state = LifecycleState::Locating;
        let runtime = self.runtime_locked(inner)?;
        let working = self.working_locked(inner, &runtime)?;
        prepare_working(&inner.config, &working)?;

        inner.state = LifecycleState::Provisioning;
        let mut store = self.store_locked(inner, &working)?;

        inner.state = LifecycleState::ValidatingBridge;
        let host = HostBinding {
            library: inner.config.host_library().map(Path::to_path_buf),
            executable: inner.config.host_executable().map(Path::to_path_buf),
        };
        let bridge = self.effects.bridge(inner.config.bridge());
        let package = inner.config.bridge().package_name();
        let mut rebuilt = false;
        let mut session = GuestSession::new(
            runtime.path.clone(),
            working.root().to_path_buf(),
            store.session_depot(),
        );
        loop {
            match bridge.check(&session, &host)? {
                BridgeStatus::Ok => break,
                BridgeStatus::Unsatisfiable { detail } => {
                    return Err(BootstrapError::BridgeBuildFailed {
                        package: package.to_string(),
                        reason: detail,
                    });
                }
                BridgeStatus::NeedsBuild { reason } => {
                    if self.switch_on_conflict(inner, &store, &reason) {
                        store = self.store_locked(inner, &working)?;
                        session = GuestSession::new(
                            runtime.path.clone(),
                            working.root().to_path_buf(),
                            store.session_depot(),
                        );
                        continue;
                    }
                    if rebuilt {
                        return Err(BootstrapError::BridgeBuildFailed {
                            package: package.to_string(),
                            reason: format!("still needs a build after rebuilding ({reason:?})"),
                        });
                    }
                    rebuilt = true;
                    tracing::info!(package, reason = ?reason, "building bridge");
                    let output = bridge.build(&session, &host, &reason)?;
                    tracing::info!(package, code = output.code, "bridge build finished");
                    if !output.success() {
                        return Err(BootstrapError::BridgeBuildFailed {
                            package: package.to_string(),
                            reason: output.failure_summary(),
                        });
                    }
                }
            }
        }

        inner.state = LifecycleState::Installing;
        let resolved =
            installer::ensure_ready(self.effects.packages(), &inner.config, &session, &store, false)?;

        inner.state = LifecycleState::LoadingImage;
        let stale_images = image::stale(&inner.config, &working, &runtime.version);
        for stale in &stale_images {
            tracing::info!(
                path = %stale.path.display(),
                built_by = %stale.builder_version,
                "ignoring image built by another julia"
            );
        }
        let image = if inner.config.use_image() {
            image::find(&inner.config, &working, &runtime.version)
        } else {
            None
        };

        Ok((
            ReadyReport {
                runtime,
                project_dir: working.root().to_path_buf(),
                store,
                image,
                stale_images,
            },
            resolved,
        ))
    }

    fn store_locked(&self, inner: &mut Inner, working: &WorkingProject) -> BootstrapResult<DependencyStore> {
        let prompt = self.prompt.as_ref();
        let questions = &mut inner.questions;
        let config = &inner.config;
        resolve_store(config, &self.env, working, inner.store_conflict, || {
            questions.ask(QuestionKey::Depot, config, &self.env, prompt)
        })
    }

    /// An incompatible build on the shared depot moves this project to a
    /// private one when nobody pinned the depot choice.
    fn switch_on_conflict(&self, inner: &mut Inner, store: &DependencyStore, reason: &BuildReason) -> bool {
        let pinned = inner.config.store_mode() != jlx_domain::StoreMode::Ask
            || self.env.contains(&inner.config.env().depot());
        if inner.store_conflict
            || pinned
            || store.is_private()
            || !matches!(reason, BuildReason::IncompatibleHost { .. })
        {
            return false;
        }
        tracing::warn!(reason = ?reason, "shared depot holds an incompatible bridge build, switching to a private depot");
        inner.store_conflict = true;
        true
    }
}

fn reset_state(inner: &mut Inner) {
    inner.state = if inner.config.enabled() {
        LifecycleState::Uninitialized
    } else {
        LifecycleState::Disabled
    };
}

/// Mirrors the package's project files and image directory into the
/// working project.
fn prepare_working(config: &ProjectConfig, working: &WorkingProject) -> BootstrapResult<()> {
    let project_files = config.project_files();
    if project_files.is_empty() {
        return Err(BootstrapError::configuration(format!(
            "{} has no Project.toml or JuliaProject.toml",
            config.package_root().display()
        )));
    }
    let root = working.root();
    let mut copied = 0;
    let manifests = MANIFEST_FILES
        .iter()
        .map(|file| config.package_root().join(file))
        .filter(|path| path.is_file());
    for source in project_files.into_iter().chain(manifests) {
        if let Some(file) = source.file_name() {
            copied += update_copy(&source, &root.join(file))
                .with_context(|| format!("copying {}", source.display()))?;
        }
    }
    let image_dir = config.package_root().join(config.image_dir_name());
    if image_dir.is_dir() {
        copied += update_copy(&image_dir, &working.image_dir(config))
            .with_context(|| format!("copying {}", image_dir.display()))?;
    }
    tracing::debug!(root = %root.display(), copied, "working project prepared");
    Ok(())
}

fn run_hook(hook: Option<&PostInitHook>, report: &ReadyReport, cwd: &Path) -> BootstrapResult<()> {
    match hook {
        None => Ok(()),
        Some(PostInitHook::Callback(callback)) => {
            tracing::info!("running post-init callback");
            callback().map_err(BootstrapError::HookFailed)
        }
        Some(PostInitHook::Command(argv)) => {
            let Some((program, args)) = argv.split_first() else {
                return Ok(());
            };
            tracing::info!(program, "running post-init command");
            let output = run_command(program, args, &report.launch_env(), cwd)
                .map_err(BootstrapError::HookFailed)?;
            tracing::info!(program, code = output.code, "post-init command finished");
            if output.success() {
                Ok(())
            } else {
                Err(BootstrapError::HookFailed(anyhow!(
                    "{program} failed ({})",
                    output.failure_summary()
                )))
            }
        }
    }
}
