use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_support::AppContext;

pub mod launches;
pub mod threads;
pub mod wait;

pub fn run_cli(ctx: &AppContext, args: &[String]) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::List => threads::cmd_list(ctx),
        CliVerb::Show => threads::cmd_show(ctx, &args[1..]),
        CliVerb::Whoami => threads::cmd_whoami(ctx),
        CliVerb::Launches => launches::cmd_launches(ctx),
        CliVerb::CleanupStale => launches::cmd_cleanup_stale(ctx),
        CliVerb::Wait => wait::cmd_wait(ctx, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
