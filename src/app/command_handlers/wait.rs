use crate::app::command_support::{parse_u64_flag, AppContext};
use crate::wait::{WaitCoordinator, WaitRequest, WaitSelection};
use std::time::Duration;

pub(crate) fn parse_wait_request(ctx: &AppContext, args: &[String]) -> Result<WaitRequest, String> {
    let mut selection = WaitSelection::default();
    let mut request = WaitRequest::new(WaitSelection::default(), ctx.controller.clone())
        .with_interval(ctx.settings.poll_interval())
        .with_stale_launch_threshold(Some(ctx.settings.stale_launch_threshold()));

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--thread" => {
                index += 1;
                let value = args.get(index).ok_or("--thread requires a value")?;
                selection.thread_ids.push(value.clone());
            }
            "--label" => {
                index += 1;
                let value = args.get(index).ok_or("--label requires a value")?;
                selection.labels.push(value.clone());
            }
            "--all" => selection.all_owned = true,
            "--summary" => request.include_summary = true,
            "--interval-ms" => {
                index += 1;
                let ms = parse_u64_flag("--interval-ms", args.get(index))?;
                if ms == 0 {
                    return Err("--interval-ms must be greater than 0".to_string());
                }
                request.interval = Duration::from_millis(ms);
            }
            "--timeout-ms" => {
                index += 1;
                let ms = parse_u64_flag("--timeout-ms", args.get(index))?;
                request.timeout = Some(Duration::from_millis(ms));
            }
            other => return Err(format!("unknown wait option `{other}`")),
        }
        index += 1;
    }

    if selection == WaitSelection::default() {
        return Err("wait requires --thread, --label or --all".to_string());
    }
    request.selection = selection;
    Ok(request)
}

pub fn cmd_wait(ctx: &AppContext, args: &[String]) -> Result<String, String> {
    let request = parse_wait_request(ctx, args)?;
    let outcome = WaitCoordinator::new(&ctx.layout)
        .run(&request)
        .map_err(|e| e.to_string())?;

    let mut lines = Vec::new();
    for finished in &outcome.finished {
        let mut line = format!("{}\t{}", finished.thread_id, finished.status);
        if let Some(summary) = &finished.summary {
            line.push('\t');
            line.push_str(&summary.replace('\n', " "));
        }
        lines.push(line);
    }
    lines.push(format!("elapsed: {}ms", outcome.elapsed.as_millis()));
    Ok(lines.join("\n"))
}
