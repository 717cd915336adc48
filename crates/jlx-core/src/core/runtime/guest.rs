use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::effects::{GuestRuntime, GuestSession, PackageManager};
use super::process::{run_command, RunOutput};

/// Runs the real `julia` executable.
pub(crate) struct SystemGuest;

fn base_args(session: &GuestSession) -> Vec<String> {
    vec![
        "--startup-file=no".to_string(),
        format!("--project={}", session.project.display()),
    ]
}

impl GuestRuntime for SystemGuest {
    fn probe_version(&self, executable: &Path) -> Result<String> {
        let output = run_command(
            &executable.display().to_string(),
            &["--startup-file=no".to_string(), "--version".to_string()],
            &[],
            executable.parent().unwrap_or_else(|| Path::new(".")),
        )?;
        if !output.success() {
            bail!(
                "{} --version failed ({})",
                executable.display(),
                output.failure_summary()
            );
        }
        parse_version_banner(&output.stdout)
    }

    fn eval(&self, session: &GuestSession, code: &str) -> Result<RunOutput> {
        let mut args = base_args(session);
        args.push("-e".to_string());
        args.push(code.to_string());
        tracing::debug!(project = %session.project.display(), code, "julia eval");
        run_command(
            &session.executable.display().to_string(),
            &args,
            &session.envs(),
            &session.project,
        )
    }

    fn run_script(&self, session: &GuestSession, script: &Path, cwd: &Path) -> Result<RunOutput> {
        let mut args = base_args(session);
        args.push(script.display().to_string());
        tracing::debug!(script = %script.display(), cwd = %cwd.display(), "julia script");
        run_command(
            &session.executable.display().to_string(),
            &args,
            &session.envs(),
            cwd,
        )
    }
}

/// Parses `julia version 1.9.3` into `1.9.3`.
pub(crate) fn parse_version_banner(stdout: &str) -> Result<String> {
    let words: Vec<&str> = stdout.split_whitespace().collect();
    match words.as_slice() {
        ["julia", "version", version, ..] => Ok((*version).to_string()),
        _ => bail!("unexpected julia version banner `{}`", stdout.trim()),
    }
}

/// Quotes `raw` as a Julia string literal.
pub(crate) fn julia_string(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for ch in raw.chars() {
        match ch {
            '"' | '\\' | '$' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// `Pkg` operations expressed as guest code.
pub(crate) struct JuliaPkg {
    guest: Arc<dyn GuestRuntime>,
}

impl JuliaPkg {
    pub(crate) fn new(guest: Arc<dyn GuestRuntime>) -> Self {
        Self { guest }
    }

    fn pkg(&self, session: &GuestSession, body: &str) -> Result<RunOutput> {
        self.guest.eval(session, &format!("import Pkg; {body}"))
    }
}

impl PackageManager for JuliaPkg {
    fn add_registry(
        &self,
        session: &GuestSession,
        name: &str,
        url: Option<&str>,
    ) -> Result<RunOutput> {
        let spec = match url {
            Some(url) => format!("Pkg.RegistrySpec(url={})", julia_string(url)),
            None => julia_string(name),
        };
        self.pkg(session, &format!("Pkg.Registry.add({spec})"))
    }

    fn instantiate(&self, session: &GuestSession, pre: Option<&str>) -> Result<RunOutput> {
        let body = match pre {
            Some(pre) => format!("{pre}; Pkg.instantiate()"),
            None => "Pkg.instantiate()".to_string(),
        };
        self.pkg(session, &body)
    }

    fn resolve(&self, session: &GuestSession) -> Result<RunOutput> {
        self.pkg(session, "Pkg.resolve()")
    }

    fn update(&self, session: &GuestSession) -> Result<RunOutput> {
        self.pkg(session, "Pkg.update(); Pkg.resolve(); Pkg.instantiate()")
    }

    fn add(&self, session: &GuestSession, package: &str) -> Result<RunOutput> {
        self.pkg(session, &format!("Pkg.add({})", julia_string(package)))
    }

    fn remove(&self, session: &GuestSession, package: &str) -> Result<RunOutput> {
        self.pkg(session, &format!("Pkg.rm({})", julia_string(package)))
    }

    fn build(
        &self,
        session: &GuestSession,
        package: &str,
        envs: &[(String, String)],
    ) -> Result<RunOutput> {
        let assignments: String = envs
            .iter()
            .map(|(key, value)| format!("ENV[{}] = {}; ", julia_string(key), julia_string(value)))
            .collect();
        self.pkg(
            session,
            &format!("{assignments}Pkg.build({})", julia_string(package)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[test]
    fn parses_version_banner() {
        assert_eq!(parse_version_banner("julia version 1.9.3\n").unwrap(), "1.9.3");
        assert_eq!(
            parse_version_banner("julia version 1.11.0-rc1").unwrap(),
            "1.11.0-rc1"
        );
        assert!(parse_version_banner("Python 3.12.1").is_err());
        assert!(parse_version_banner("").is_err());
    }

    #[test]
    fn quotes_julia_strings() {
        assert_eq!(julia_string("plain"), "\"plain\"");
        assert_eq!(julia_string("a\"b$c\\"), "\"a\\\"b\\$c\\\\\"");
    }

    #[derive(Default)]
    struct RecordingGuest {
        code: Mutex<Vec<String>>,
    }

    impl GuestRuntime for RecordingGuest {
        fn probe_version(&self, _executable: &Path) -> Result<String> {
            Ok("1.9.3".into())
        }

        fn eval(&self, _session: &GuestSession, code: &str) -> Result<RunOutput> {
            self.code.lock().unwrap().push(code.to_string());
            Ok(RunOutput::default())
        }

        fn run_script(&self, _: &GuestSession, _: &Path, _: &Path) -> Result<RunOutput> {
            Ok(RunOutput::default())
        }
    }

    #[test]
    fn pkg_operations_render_guest_code() {
        let guest = Arc::new(RecordingGuest::default());
        let pkg = JuliaPkg::new(guest.clone());
        let session = GuestSession::new(PathBuf::from("julia"), PathBuf::from("/work"), None);
        pkg.add_registry(&session, "General", None).unwrap();
        pkg.add_registry(&session, "Local", Some("https://example.com/Local"))
            .unwrap();
        pkg.build(
            &session,
            "PyCall",
            &[("PYTHON".to_string(), "/usr/bin/python3".to_string())],
        )
        .unwrap();
        pkg.instantiate(&session, Some("Pkg.precompile()")).unwrap();
        pkg.remove(&session, "PythonCall").unwrap();
        let code = guest.code.lock().unwrap().clone();
        assert_eq!(code[0], "import Pkg; Pkg.Registry.add(\"General\")");
        assert_eq!(
            code[1],
            "import Pkg; Pkg.Registry.add(Pkg.RegistrySpec(url=\"https://example.com/Local\"))"
        );
        assert_eq!(
            code[2],
            "import Pkg; ENV[\"PYTHON\"] = \"/usr/bin/python3\"; Pkg.build(\"PyCall\")"
        );
        assert_eq!(code[3], "import Pkg; Pkg.precompile(); Pkg.instantiate()");
        assert_eq!(code[4], "import Pkg; Pkg.rm(\"PythonCall\")");
    }
}
