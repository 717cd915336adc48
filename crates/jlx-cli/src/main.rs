#![deny(clippy::all, warnings)]

use std::sync::Arc;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use jlx_core::{CommandContext, GlobalOptions, LogOptions, SystemEffects};

mod cli;
mod dispatch;
mod output;
mod prompt;
mod style;

use cli::JlxCli;
use output::{emit_output, OutputOptions};
use prompt::TerminalPrompt;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = JlxCli::parse();
    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        no_input: cli.no_input,
        root: cli.root.clone(),
    };

    let ctx = CommandContext::new(
        &global,
        Arc::new(SystemEffects::new()),
        Arc::new(TerminalPrompt::new(cli.no_color)),
    );
    init_tracing(&cli, &ctx)?;

    let (info, outcome) = dispatch::dispatch_command(&ctx, &cli.command)?;
    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = emit_output(&opts, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(cli: &JlxCli, ctx: &CommandContext) -> Result<()> {
    let file = cli.log_file.clone().or_else(|| {
        ctx.project_root()
            .ok()
            .and_then(|root| jlx_core::default_log_path(&root, ctx.env()))
    });
    let options = LogOptions {
        file,
        console: cli.console_log || cli.verbose > 0 || cli.trace,
        verbose: cli.verbose,
        trace: cli.trace,
        ansi: !cli.no_color && atty::is(Stream::Stderr),
    };
    jlx_core::init_logging(&options).map_err(|err| eyre!("{err:?}"))
}
