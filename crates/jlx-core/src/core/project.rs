//! Command handlers behind the `jlx` subcommands.

use std::path::PathBuf;

use anyhow::Result;
use jlx_domain::{ProjectConfig, StoreMode};
use serde_json::{json, Value};

use crate::bootstrap::lifecycle::{InitStatus, Lifecycle, ReadyReport};
use crate::config::context::CommandContext;
use crate::tooling::errors::BootstrapResult;
use crate::tooling::outcome::ExecutionOutcome;

/// Per-invocation overrides layered over `jlx.toml`.
#[derive(Clone, Debug, Default)]
pub struct BootstrapRequest {
    pub julia: Option<PathBuf>,
    pub version_spec: Option<String>,
    pub allow_prerelease: bool,
    pub depot: Option<StoreMode>,
    pub compile: Option<bool>,
    pub install: Option<bool>,
    pub no_sys_image: bool,
}

fn load_config(ctx: &CommandContext, request: &BootstrapRequest) -> BootstrapResult<ProjectConfig> {
    let mut builder = ctx.config_builder()?;
    if let Some(julia) = &request.julia {
        builder = builder.runtime_path(julia);
    }
    if let Some(spec) = &request.version_spec {
        builder = builder.version_spec(spec);
    }
    if request.allow_prerelease {
        builder = builder.strict_version(false);
    }
    if let Some(depot) = request.depot {
        builder = builder.store_mode(depot);
    }
    if request.compile.is_some() {
        builder = builder.compile(request.compile);
    }
    if request.install.is_some() {
        builder = builder.install_runtime(request.install);
    }
    if request.no_sys_image {
        builder = builder.use_image(false);
    }
    Ok(builder.build()?)
}

fn lifecycle(ctx: &CommandContext, request: &BootstrapRequest) -> BootstrapResult<Lifecycle> {
    let config = load_config(ctx, request)?;
    Ok(Lifecycle::with_env(
        config,
        ctx.shared_effects(),
        ctx.prompt(),
        ctx.env().clone(),
    ))
}

fn into_outcome<T>(
    result: BootstrapResult<T>,
    render: impl FnOnce(T) -> ExecutionOutcome,
) -> Result<ExecutionOutcome> {
    Ok(match result {
        Ok(value) => render(value),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            ExecutionOutcome::from_error(&err)
        }
    })
}

fn ready_details(report: &ReadyReport) -> Value {
    let mut details = json!(report);
    details["launch_args"] = json!(report.launch_args());
    details["launch_env"] = report
        .launch_env()
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect::<serde_json::Map<_, _>>()
        .into();
    details
}

/// Brings the project's julia runtime to Ready.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn project_init(ctx: &CommandContext, request: &BootstrapRequest) -> Result<ExecutionOutcome> {
    let result = lifecycle(ctx, request).and_then(|lifecycle| lifecycle.ensure_init());
    into_outcome(result, |status| match status {
        InitStatus::Ready(report) => {
            let image = match &report.image {
                Some(image) => format!(" with {}", image.path.display()),
                None => String::new(),
            };
            ExecutionOutcome::success(
                format!(
                    "julia {} ready at {}{image}",
                    report.runtime.version,
                    report.project_dir.display()
                ),
                ready_details(&report),
            )
        }
        InitStatus::Disabled => {
            ExecutionOutcome::success("julia initialization is disabled", json!({}))
        }
    })
}

/// Compiles a system image tagged with the runtime's version.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn project_compile(
    ctx: &CommandContext,
    request: &BootstrapRequest,
) -> Result<ExecutionOutcome> {
    let result = lifecycle(ctx, request).and_then(|lifecycle| lifecycle.compile());
    into_outcome(result, |image| {
        ExecutionOutcome::success(
            format!(
                "compiled {} with julia {}",
                image.path.display(),
                image.builder_version
            ),
            json!({ "image": image }),
        )
    })
}

/// Updates and re-resolves the working project's packages.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn project_update(
    ctx: &CommandContext,
    request: &BootstrapRequest,
) -> Result<ExecutionOutcome> {
    let result = lifecycle(ctx, request).and_then(|lifecycle| lifecycle.update());
    into_outcome(result, |project| {
        ExecutionOutcome::success(
            format!("updated packages in {}", project.display()),
            json!({ "project_dir": project }),
        )
    })
}

/// Removes compiled images and resolution caches.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn project_clean(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let result = lifecycle(ctx, &BootstrapRequest::default()).and_then(|lifecycle| lifecycle.clean());
    into_outcome(result, |report| {
        ExecutionOutcome::success(
            format!("removed {} file(s)", report.removed.len()),
            json!(report),
        )
    })
}

/// Removes every working project, private depots included.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn project_clean_all(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let result =
        lifecycle(ctx, &BootstrapRequest::default()).and_then(|lifecycle| lifecycle.clean_all());
    into_outcome(result, |report| {
        ExecutionOutcome::success(
            format!("removed {} working project(s)", report.removed.len()),
            json!(report),
        )
    })
}

/// Reports which julia would be used, without initializing the project.
///
/// # Errors
/// Returns an error only for failures outside the bootstrap taxonomy.
pub fn runtime_locate(
    ctx: &CommandContext,
    request: &BootstrapRequest,
) -> Result<ExecutionOutcome> {
    let result = lifecycle(ctx, request).and_then(|lifecycle| lifecycle.locate());
    into_outcome(result, |runtime| {
        ExecutionOutcome::success(
            format!(
                "julia {} at {} ({})",
                runtime.version,
                runtime.path.display(),
                runtime.source
            ),
            json!({ "runtime": runtime }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::questions::NonInteractive;
    use crate::bootstrap::testing::{fake_executable, FakeEffects};
    use crate::config::{EnvSnapshot, GlobalOptions};
    use crate::runtime::effects::SharedEffects;
    use crate::tooling::outcome::CommandStatus;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn project(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("pkg");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("jlx.toml"),
            "[project]\nname = \"mymod\"\nenv-prefix = \"MYMOD_\"\ndepot = \"shared\"\nuse-sys-image = false\n",
        )
        .unwrap();
        fs::write(root.join("Project.toml"), "name = \"mymod\"\n").unwrap();
        root
    }

    fn env(temp: &TempDir) -> EnvSnapshot {
        let depot = temp.path().join("shared-depot").display().to_string();
        EnvSnapshot::from_pairs(&[("JULIA_DEPOT_PATH", depot.as_str())])
    }

    #[test]
    fn init_reports_ready_runtime() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let fake = Arc::new(FakeEffects::new(temp.path()));
        let julia = fake_executable(&temp.path().join("bin"), "julia");
        fake.probe(&julia, "1.9.4");
        let global = GlobalOptions {
            root: Some(root),
            ..GlobalOptions::default()
        };
        let effects: SharedEffects = fake.clone();
        let ctx = CommandContext::with_env(&global, effects, Arc::new(NonInteractive::default()), env(&temp));
        let request = BootstrapRequest {
            julia: Some(julia.clone()),
            ..BootstrapRequest::default()
        };

        let outcome = project_init(&ctx, &request).unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok, "{}", outcome.message);
        assert!(outcome.message.starts_with("julia 1.9.4 ready"));
        assert_eq!(outcome.details["runtime"]["source"], "explicit-override");
        assert!(outcome.details["launch_args"][0]
            .as_str()
            .unwrap()
            .starts_with("--project="));

        let outcome = runtime_locate(&ctx, &request).unwrap();
        assert_eq!(outcome.details["runtime"]["version"], "1.9.4");
    }

    #[test]
    fn configuration_errors_are_user_errors() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let fake: SharedEffects = Arc::new(FakeEffects::new(temp.path()));
        let global = GlobalOptions {
            root: Some(root),
            ..GlobalOptions::default()
        };
        let ctx = CommandContext::with_env(&global, fake, Arc::new(NonInteractive::default()), env(&temp));
        let request = BootstrapRequest {
            version_spec: Some("not a spec".into()),
            ..BootstrapRequest::default()
        };
        let outcome = project_init(&ctx, &request).unwrap();
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "configuration");
    }

    #[test]
    fn clean_all_without_working_projects_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let fake: SharedEffects = Arc::new(FakeEffects::new(temp.path()));
        let global = GlobalOptions {
            root: Some(root),
            ..GlobalOptions::default()
        };
        let ctx = CommandContext::with_env(&global, fake, Arc::new(NonInteractive::default()), env(&temp));
        let outcome = project_clean_all(&ctx).unwrap();
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.message, "removed 0 working project(s)");
    }
}
