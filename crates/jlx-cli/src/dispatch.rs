use color_eyre::{eyre::eyre, Result};
use jlx_core::{CommandContext, CommandInfo, ExecutionOutcome};

use crate::cli::CommandGroupCli;

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Init(args) => core_call(CommandInfo::new("init"), || {
            jlx_core::project_init(ctx, &args.request())
        }),
        CommandGroupCli::Compile(args) => core_call(CommandInfo::new("compile"), || {
            jlx_core::project_compile(ctx, &args.request())
        }),
        CommandGroupCli::Update(args) => core_call(CommandInfo::new("update"), || {
            jlx_core::project_update(ctx, &args.request())
        }),
        CommandGroupCli::Clean => {
            core_call(CommandInfo::new("clean"), || jlx_core::project_clean(ctx))
        }
        CommandGroupCli::CleanAll => core_call(CommandInfo::new("clean-all"), || {
            jlx_core::project_clean_all(ctx)
        }),
        CommandGroupCli::Locate(args) => core_call(CommandInfo::new("locate"), || {
            jlx_core::runtime_locate(ctx, &args.request())
        }),
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> Result<(CommandInfo, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    tracing::debug!(command = info.name, "dispatching");
    match action() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => Err(eyre!("{err:?}")),
    }
}
