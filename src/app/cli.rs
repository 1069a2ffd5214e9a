#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    List,
    Show,
    Launches,
    CleanupStale,
    Wait,
    Whoami,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "list" => CliVerb::List,
        "show" => CliVerb::Show,
        "launches" => CliVerb::Launches,
        "cleanup-stale" => CliVerb::CleanupStale,
        "wait" => CliVerb::Wait,
        "whoami" => CliVerb::Whoami,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  list                      List threads owned by this controller".to_string(),
        "  show <thread-id>          Print one owned thread record as JSON".to_string(),
        "  launches                  List this controller's pending and failed launches"
            .to_string(),
        "  cleanup-stale             Mark launches pending past the stale threshold as failed"
            .to_string(),
        "  wait [options]            Block until selected threads stop running".to_string(),
        "      --thread <id>         Wait on a thread (repeatable)".to_string(),
        "      --label <label>       Wait on owned threads and pending launches with a label"
            .to_string(),
        "      --all                 Wait on every owned thread and pending launch".to_string(),
        "      --interval-ms <n>     Poll interval".to_string(),
        "      --timeout-ms <n>      Give up after this long".to_string(),
        "      --summary             Print each finished thread's last assistant message"
            .to_string(),
        "  whoami                    Print the resolved controller id".to_string(),
    ]
}

pub fn help_text() -> String {
    cli_help_lines().join("\n")
}
