use atty::Stream;
use color_eyre::Result;
use jlx_core::{CommandInfo, CommandStatus, ExecutionOutcome};
use serde_json::Value;

use crate::style::Style;

#[derive(Clone, Copy, Debug)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

pub fn exit_code(status: &CommandStatus) -> i32 {
    match status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    }
}

pub fn emit_output(opts: &OutputOptions, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = exit_code(&outcome.status);
    let style = Style::new(opts.no_color, atty::is(Stream::Stdout));

    if opts.json {
        let payload = jlx_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }
    if opts.quiet && outcome.status == CommandStatus::Ok {
        return Ok(code);
    }

    let message = jlx_core::format_status_message(info, &outcome.message);
    if outcome.status == CommandStatus::Ok {
        println!("{}", style.status(&outcome.status, &message));
        if let Some(count) = stale_count(&outcome.details) {
            let line = format!("{count} image(s) built by other julia versions were kept; `jlx clean` removes them");
            println!("{}", style.info(&line));
        }
    } else {
        eprintln!("{}", style.status(&outcome.status, &message));
        if let Some(reason) = string_field(&outcome.details, "reason") {
            eprintln!("{}", style.detail("reason", reason));
        }
        if let Some(hint) = string_field(&outcome.details, "hint") {
            let hint_line = format!("Hint: {hint}");
            eprintln!("{}", style.info(&hint_line));
        }
    }
    Ok(code)
}

fn string_field<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details
        .as_object()
        .and_then(|map| map.get(key))
        .and_then(Value::as_str)
}

fn stale_count(details: &Value) -> Option<usize> {
    let count = details.get("stale_images")?.as_array()?.len();
    (count > 0).then_some(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_codes_follow_status() {
        assert_eq!(exit_code(&CommandStatus::Ok), 0);
        assert_eq!(exit_code(&CommandStatus::UserError), 1);
        assert_eq!(exit_code(&CommandStatus::Failure), 2);
    }

    #[test]
    fn stale_images_are_counted_only_when_present() {
        assert_eq!(stale_count(&json!({ "stale_images": [] })), None);
        assert_eq!(stale_count(&json!({ "stale_images": [{}, {}] })), Some(2));
        assert_eq!(stale_count(&json!({})), None);
    }
}
