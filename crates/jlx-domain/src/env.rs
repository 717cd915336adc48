//! Names and parsing for the prefixed environment overrides.

pub const DEFAULT_ENV_PREFIX: &str = "JULIA_PROJECT_";

/// The prefixed variables a host package consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVars {
    prefix: String,
}

impl EnvVars {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn julia_path(&self) -> String {
        self.name("JULIA_PATH")
    }

    #[must_use]
    pub fn install_julia(&self) -> String {
        self.name("INSTALL_JULIA")
    }

    #[must_use]
    pub fn compile(&self) -> String {
        self.name("COMPILE")
    }

    #[must_use]
    pub fn depot(&self) -> String {
        self.name("DEPOT")
    }

    #[must_use]
    pub fn log_path(&self) -> String {
        self.name("LOG_PATH")
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }
}

impl Default for EnvVars {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{name} must be 'y' or 'n', found '{value}'")]
pub struct YesNoError {
    pub name: String,
    pub value: String,
}

/// Parses a `y`/`n` override. Anything else is rejected.
///
/// # Errors
/// Returns [`YesNoError`] naming the variable when the value is not `y` or `n`.
pub fn parse_yes_no(name: &str, value: &str) -> Result<bool, YesNoError> {
    match value {
        "y" => Ok(true),
        "n" => Ok(false),
        other => Err(YesNoError {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}
