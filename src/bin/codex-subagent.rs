use codex_subagent::app::{run_cli, AppContext};
use codex_subagent::logging::init_tracing;

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let ctx = AppContext::bootstrap()?;
    let output = run_cli(&ctx, &args)?;
    println!("{output}");
    Ok(())
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
