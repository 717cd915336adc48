//! Terminal answers for bootstrap questions.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use jlx_core::{Prompt, Question};

use crate::style::Style;

pub struct TerminalPrompt {
    style: Style,
}

impl TerminalPrompt {
    pub fn new(no_color: bool) -> Self {
        Self {
            style: Style::new(no_color, atty::is(atty::Stream::Stderr)),
        }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &Question) -> Result<bool> {
        if !atty::is(atty::Stream::Stdin) {
            tracing::debug!(question = %question.text, "stdin is not a terminal, using default");
            return Ok(question.default);
        }
        let choices = if question.default { "(Y/n)" } else { "(y/N)" };
        let mut stderr = io::stderr();
        write!(stderr, "{} {choices} ", self.style.question(&question.text))?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("reading answer from stdin")?;
        Ok(parse_answer(&line, question.default))
    }
}

fn parse_answer(line: &str, default: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}
