use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "CODEX_SUBAGENT_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
