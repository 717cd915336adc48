use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand, ValueEnum};
use jlx_core::BootstrapRequest;
use jlx_domain::StoreMode;

pub const JLX_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nCommands:\n{subcommands}\n\nGlobal options:\n{options}\n";

pub const JLX_BEFORE_HELP: &str = concat!(
    "jlx ",
    env!("CARGO_PKG_VERSION"),
    " – Embedded Julia runtime bootstrapper\n\n",
    "\x1b[1;36mLifecycle\x1b[0m\n",
    "  init             Locate julia, provision the depot, install packages, load the image.\n",
    "  compile          Build a system image tagged with the runtime version.\n",
    "  update           Update and re-resolve the working project's packages.\n",
    "  clean            Remove compiled images and resolution caches.\n",
    "  clean-all        Remove every working project, private depots included.\n\n",
    "\x1b[1;36mRuntime\x1b[0m\n",
    "  locate           Show which julia would be used and where it came from.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = JLX_BEFORE_HELP,
    help_template = JLX_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct JlxCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_parser = value_parser!(PathBuf),
        help = "Package root (defaults to the nearest directory with jlx.toml or Project.toml)",
        global = true
    )]
    pub root: Option<PathBuf>,
    #[arg(
        long,
        value_parser = value_parser!(PathBuf),
        help = "Append the decision log to this file (defaults to <PREFIX>LOG_PATH)",
        global = true
    )]
    pub log_file: Option<PathBuf>,
    #[arg(long, help = "Mirror the decision log to stderr", global = true)]
    pub console_log: bool,
    #[arg(
        long = "no-input",
        help = "Never prompt; answer every question with its default",
        global = true
    )]
    pub no_input: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Bring the package's julia runtime to Ready.",
        override_usage = "jlx init [--julia PATH] [--version-spec SPEC] [--depot shared|private]",
        after_help = "Examples:\n  jlx init\n  jlx init --julia /opt/julia/bin/julia --no-sys-image\n  MYPKG_INSTALL_JULIA=y jlx --no-input init\n"
    )]
    Init(BootstrapArgs),
    #[command(
        about = "Compile a system image for the located julia.",
        override_usage = "jlx compile [--julia PATH]",
        after_help = "Example:\n  jlx compile\n"
    )]
    Compile(BootstrapArgs),
    #[command(
        about = "Update and re-resolve the working project's packages.",
        override_usage = "jlx update",
        after_help = "Example:\n  jlx update\n"
    )]
    Update(BootstrapArgs),
    #[command(
        about = "Remove compiled images and resolution caches.",
        after_help = "Example:\n  jlx clean\n"
    )]
    Clean,
    #[command(
        name = "clean-all",
        about = "Remove every working project, private depots included.",
        after_help = "Example:\n  jlx clean-all\n"
    )]
    CleanAll,
    #[command(
        about = "Show which julia would be used, without initializing.",
        override_usage = "jlx locate [--julia PATH] [--version-spec SPEC]",
        after_help = "Examples:\n  jlx locate\n  jlx --json locate --version-spec '>=1.6, <1.10'\n"
    )]
    Locate(BootstrapArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DepotArg {
    Shared,
    Private,
}

impl From<DepotArg> for StoreMode {
    fn from(value: DepotArg) -> Self {
        match value {
            DepotArg::Shared => StoreMode::Shared,
            DepotArg::Private => StoreMode::Private,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct BootstrapArgs {
    #[arg(
        long,
        value_name = "PATH",
        value_parser = value_parser!(PathBuf),
        help = "Use this julia executable instead of searching"
    )]
    pub julia: Option<PathBuf>,
    #[arg(
        long,
        value_name = "SPEC",
        help = "Version constraint, e.g. '>=1.6, <1.10'"
    )]
    pub version_spec: Option<String>,
    #[arg(long, help = "Let pre-release julia builds satisfy the constraint")]
    pub allow_prerelease: bool,
    #[arg(long, value_enum, help = "Where packages are installed")]
    pub depot: Option<DepotArg>,
    #[arg(long, overrides_with = "no_compile", help = "Compile a system image when none exists")]
    pub compile: bool,
    #[arg(long, overrides_with = "compile", help = "Never compile automatically")]
    pub no_compile: bool,
    #[arg(long, overrides_with = "no_install", help = "Install julia when none is found")]
    pub install: bool,
    #[arg(long, overrides_with = "install", help = "Never install julia")]
    pub no_install: bool,
    #[arg(long, help = "Do not load a compiled system image")]
    pub no_sys_image: bool,
}

impl BootstrapArgs {
    pub fn request(&self) -> BootstrapRequest {
        BootstrapRequest {
            julia: self.julia.clone(),
            version_spec: self.version_spec.clone(),
            allow_prerelease: self.allow_prerelease,
            depot: self.depot.map(StoreMode::from),
            compile: flag_pair(self.compile, self.no_compile),
            install: flag_pair(self.install, self.no_install),
            no_sys_image: self.no_sys_image,
        }
    }
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_flag_wins_in_pairs() {
        let cli = JlxCli::parse_from(["jlx", "init", "--compile", "--no-compile", "--depot", "private"]);
        let CommandGroupCli::Init(args) = cli.command else {
            panic!("expected init");
        };
        let request = args.request();
        assert_eq!(request.compile, Some(false));
        assert_eq!(request.install, None);
        assert_eq!(request.depot, Some(StoreMode::Private));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = JlxCli::parse_from(["jlx", "locate", "--json", "--no-input", "--root", "/pkg"]);
        assert!(cli.json);
        assert!(cli.no_input);
        assert_eq!(cli.root, Some(PathBuf::from("/pkg")));
    }
}
