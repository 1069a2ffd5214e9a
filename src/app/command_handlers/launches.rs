use crate::app::command_support::AppContext;
use crate::shared::time::now_utc;

pub fn cmd_launches(ctx: &AppContext) -> Result<String, String> {
    let registry = ctx.launch_registry();
    registry
        .cleanup_stale(ctx.settings.stale_launch_threshold(), now_utc())
        .map_err(|e| e.to_string())?;
    let attempts = registry.list_attempts().map_err(|e| e.to_string())?;
    let lines = attempts
        .iter()
        .filter(|attempt| attempt.controller_id == ctx.controller.as_str())
        .map(|attempt| {
            let mut line = format!(
                "{}\t{}\t{}\t{}",
                attempt.id,
                attempt.status,
                attempt.kind,
                attempt.label.as_deref().unwrap_or("-")
            );
            if let Some(error) = &attempt.error_message {
                line.push_str(&format!("\t{error}"));
            }
            if let Some(log_path) = &attempt.log_path {
                line.push_str(&format!("\t{log_path}"));
            }
            line
        })
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return Ok("no launches".to_string());
    }
    Ok(lines.join("\n"))
}

pub fn cmd_cleanup_stale(ctx: &AppContext) -> Result<String, String> {
    let count = ctx
        .launch_registry()
        .cleanup_stale(ctx.settings.stale_launch_threshold(), now_utc())
        .map_err(|e| e.to_string())?;
    Ok(format!("marked {count} stale launch(es) as failed"))
}
