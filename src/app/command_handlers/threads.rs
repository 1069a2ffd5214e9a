use crate::app::command_support::AppContext;
use crate::ownership::{load_owned_thread, owned_threads};

pub fn cmd_list(ctx: &AppContext) -> Result<String, String> {
    let threads =
        owned_threads(&ctx.thread_registry(), &ctx.controller).map_err(|e| e.to_string())?;
    if threads.is_empty() {
        return Ok("no threads".to_string());
    }
    let lines = threads
        .iter()
        .map(|thread| {
            format!(
                "{}\t{}\t{}\t{}",
                thread.thread_id,
                thread.status_label(),
                thread.label.as_deref().unwrap_or("-"),
                thread.updated_at
            )
        })
        .collect::<Vec<_>>();
    Ok(lines.join("\n"))
}

pub fn cmd_show(ctx: &AppContext, args: &[String]) -> Result<String, String> {
    let thread_id = args
        .first()
        .ok_or_else(|| "usage: show <thread-id>".to_string())?;
    let thread = load_owned_thread(&ctx.thread_registry(), thread_id, &ctx.controller)
        .map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&thread).map_err(|e| e.to_string())
}

pub fn cmd_whoami(ctx: &AppContext) -> Result<String, String> {
    Ok(ctx.controller.to_string())
}
