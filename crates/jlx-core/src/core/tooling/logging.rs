//! Decision log: an append-only file plus an optional console mirror.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use jlx_domain::{load_project_config, ProjectConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::EnvSnapshot;

#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    pub file: Option<PathBuf>,
    pub console: bool,
    pub verbose: u8,
    pub trace: bool,
    pub ansi: bool,
}

impl LogOptions {
    fn level(&self) -> &'static str {
        if self.trace {
            return "trace";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `<PREFIX>LOG_PATH` of the project at `root`, when the project
/// configuration loads and the variable is set.
#[must_use]
pub fn default_log_path(root: &Path, env: &EnvSnapshot) -> Option<PathBuf> {
    let config = load_project_config(root).ok()?.build().ok()?;
    log_path_for(&config, env)
}

fn log_path_for(config: &ProjectConfig, env: &EnvSnapshot) -> Option<PathBuf> {
    env.non_empty(&config.env().log_path()).map(PathBuf::from)
}

/// Installs the global subscriber. Calling it twice keeps the first one.
///
/// # Errors
/// Returns an error when the log file cannot be opened for appending.
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let filter = EnvFilter::new(format!(
        "jlx={level},jlx_core={level},jlx_cli={level}",
        level = options.level()
    ));
    let file_layer = match &options.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(open_append(path)?)),
        ),
        None => None,
    };
    let console_layer = options.console.then(|| {
        fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_ansi(options.ansi)
            .with_writer(std::io::stderr)
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();
    Ok(())
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn log_path_prefers_prefixed_override() {
        let config = ProjectConfig::builder("mymod", "/pkg")
            .env_prefix("MYMOD_")
            .build()
            .unwrap();
        let env = EnvSnapshot::from_pairs(&[("MYMOD_LOG_PATH", "/tmp/custom.log")]);
        assert_eq!(log_path_for(&config, &env), Some(PathBuf::from("/tmp/custom.log")));
        let env = EnvSnapshot::from_pairs(&[("MYMOD_LOG_PATH", " ")]);
        assert_eq!(log_path_for(&config, &env), None);
    }

    #[test]
    fn log_path_reads_project_prefix() -> Result<()> {
        let temp = TempDir::new()?;
        std::fs::write(
            temp.path().join("jlx.toml"),
            "[project]\nname = \"mymod\"\nenv-prefix = \"MYMOD_\"\n",
        )?;
        let env = EnvSnapshot::from_pairs(&[("MYMOD_LOG_PATH", "decisions.log")]);
        assert_eq!(
            default_log_path(temp.path(), &env),
            Some(PathBuf::from("decisions.log"))
        );
        assert_eq!(default_log_path(&temp.path().join("missing"), &env), None);
        Ok(())
    }

    #[test]
    fn open_append_creates_parents_and_appends() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("logs/mymod.log");
        {
            use std::io::Write;
            let mut file = open_append(&path)?;
            writeln!(file, "first")?;
            let mut file = open_append(&path)?;
            writeln!(file, "second")?;
        }
        assert_eq!(std::fs::read_to_string(&path)?, "first\nsecond\n");
        Ok(())
    }
}
