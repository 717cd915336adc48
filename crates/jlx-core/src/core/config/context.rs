use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context, Result};
use jlx_domain::{discover_project_root, load_project_config, ProjectConfigBuilder};

use crate::bootstrap::questions::{NonInteractive, Prompt};
use crate::config::{EnvSnapshot, GlobalOptions};
use crate::runtime::effects::{Effects, SharedEffects};
use crate::tooling::errors::BootstrapResult;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    env: EnvSnapshot,
    effects: SharedEffects,
    prompt: Arc<dyn Prompt>,
    project_root: OnceLock<PathBuf>,
}

impl<'a> CommandContext<'a> {
    /// `--no-input` replaces `prompt` with defaults-only answers.
    #[must_use]
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects, prompt: Arc<dyn Prompt>) -> Self {
        Self::with_env(global, effects, prompt, EnvSnapshot::capture())
    }

    #[must_use]
    pub fn with_env(
        global: &'a GlobalOptions,
        effects: SharedEffects,
        prompt: Arc<dyn Prompt>,
        env: EnvSnapshot,
    ) -> Self {
        let prompt: Arc<dyn Prompt> = if global.no_input {
            Arc::new(NonInteractive::default())
        } else {
            prompt
        };
        Self {
            global,
            env,
            effects,
            prompt,
            project_root: OnceLock::new(),
        }
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn shared_effects(&self) -> SharedEffects {
        self.effects.clone()
    }

    pub fn prompt(&self) -> Arc<dyn Prompt> {
        self.prompt.clone()
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// `--root`, else the nearest directory above the working directory with
    /// `jlx.toml` or a project file.
    ///
    /// # Errors
    /// Returns an error when no project can be found.
    pub fn project_root(&self) -> Result<PathBuf> {
        if let Some(path) = self.project_root.get() {
            return Ok(path.clone());
        }
        let path = match &self.global.root {
            Some(root) => root.clone(),
            None => {
                let cwd = env::current_dir().context("unable to determine project root")?;
                discover_project_root(&cwd).ok_or_else(|| {
                    anyhow!("no julia project found above {}", cwd.display())
                })?
            }
        };
        let _ = self.project_root.set(path.clone());
        Ok(path)
    }

    /// The project's `jlx.toml` (or `Project.toml` name) as a builder.
    ///
    /// # Errors
    /// Configuration errors, including a missing project.
    pub fn config_builder(&self) -> BootstrapResult<ProjectConfigBuilder> {
        let root = self
            .project_root()
            .map_err(|err| crate::tooling::errors::BootstrapError::configuration(err.to_string()))?;
        Ok(load_project_config(&root)?)
    }
}
