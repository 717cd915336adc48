use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::BootstrapError;
use crate::config::context::CommandInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Maps a bootstrap failure onto the command status taxonomy.
    #[must_use]
    pub fn from_error(err: &BootstrapError) -> Self {
        let mut details = json!({ "reason": err.reason() });
        if let Some(hint) = err.hint() {
            details["hint"] = Value::String(hint.to_string());
        }
        match err {
            BootstrapError::RuntimeNotFound { searched } => {
                details["searched"] = json!(searched);
            }
            BootstrapError::ConstraintUnsatisfied { found, constraint } => {
                details["found"] = json!(found);
                details["constraint"] = json!(constraint);
            }
            _ => {}
        }
        let message = err.to_string();
        if err.is_user_error() {
            Self::user_error(message, details)
        } else {
            Self::failure(message, details)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

/// The `--json` envelope.
#[must_use]
pub fn to_json_response(info: CommandInfo, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(info, &outcome.message),
        "details": details,
    })
}

#[must_use]
pub fn format_status_message(info: CommandInfo, message: &str) -> String {
    let prefix = format!("jlx {}", info.name);
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}
