//! Yes/no decisions: explicit configuration, then environment, then the prompt.

use std::collections::HashMap;

use jlx_domain::{parse_yes_no, ProjectConfig};

use crate::config::EnvSnapshot;
use crate::tooling::errors::BootstrapResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuestionKey {
    InstallRuntime,
    Compile,
    Depot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub key: QuestionKey,
    pub text: String,
    pub default: bool,
}

/// Injected decision function; the CLI asks on the terminal.
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &Question) -> anyhow::Result<bool>;
}

/// Answers every question with its default, or with a fixed answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonInteractive {
    answer: Option<bool>,
}

impl NonInteractive {
    #[must_use]
    pub fn always(answer: bool) -> Self {
        Self {
            answer: Some(answer),
        }
    }
}

impl Prompt for NonInteractive {
    fn confirm(&self, question: &Question) -> anyhow::Result<bool> {
        Ok(self.answer.unwrap_or(question.default))
    }
}

/// Answers cached for the lifetime of a controller.
#[derive(Debug, Default)]
pub(crate) struct Questions {
    answers: HashMap<QuestionKey, bool>,
}

impl Questions {
    pub(crate) fn reset(&mut self) {
        self.answers.clear();
    }

    /// The answer fixed by configuration or environment, if any.
    pub(crate) fn preset(
        &self,
        key: QuestionKey,
        config: &ProjectConfig,
        env: &EnvSnapshot,
    ) -> BootstrapResult<Option<bool>> {
        if let Some(answer) = self.answers.get(&key) {
            return Ok(Some(*answer));
        }
        let explicit = match key {
            QuestionKey::InstallRuntime => config.install_answer(),
            QuestionKey::Compile => config.compile_answer(),
            QuestionKey::Depot => None,
        };
        if explicit.is_some() {
            return Ok(explicit);
        }
        let name = env_name(key, config);
        match env.var(&name) {
            Some(value) => Ok(Some(parse_yes_no(&name, value)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn ask(
        &mut self,
        key: QuestionKey,
        config: &ProjectConfig,
        env: &EnvSnapshot,
        prompt: &dyn Prompt,
    ) -> BootstrapResult<bool> {
        let answer = match self.preset(key, config, env)? {
            Some(answer) => {
                tracing::info!(question = ?key, answer, "answer preset");
                answer
            }
            None => {
                let question = question_for(key, config);
                let answer = prompt.confirm(&question)?;
                tracing::info!(question = ?key, answer, "answer prompted");
                answer
            }
        };
        self.answers.insert(key, answer);
        Ok(answer)
    }
}

fn env_name(key: QuestionKey, config: &ProjectConfig) -> String {
    match key {
        QuestionKey::InstallRuntime => config.env().install_julia(),
        QuestionKey::Compile => config.env().compile(),
        QuestionKey::Depot => config.env().depot(),
    }
}

fn question_for(key: QuestionKey, config: &ProjectConfig) -> Question {
    let (text, default) = match key {
        QuestionKey::InstallRuntime => (
            format!(
                "No julia satisfying `{}` was found. Download and install it?",
                config.constraint().spec()
            ),
            true,
        ),
        QuestionKey::Compile => (
            format!(
                "Compile a system image for {} to speed up start-up? This can take a while.",
                config.name()
            ),
            false,
        ),
        QuestionKey::Depot => (
            format!("Use a private depot for {} instead of the shared one?", config.name()),
            false,
        ),
    };
    Question { key, text, default }
}
